//! basin-sink: columnar artifact export and restore.
//!
//! Writers are atomic per file (write-then-rename, one retry) and the sink
//! guarantees at most one writer per final path by construction: every
//! artifact path is a pure function of (directory, N, cycle id). Readers are
//! stateless and only used for checkpoint validation and restore.

mod export;
mod restore;
mod writer;

pub use export::{
    basin_assignments_path, basin_flows_path, basin_layers_path, basin_members_path,
    basin_stability_path, branches_path, coverage_path, cycles_path, layer_connectivity_path,
    multiplex_assignments_path, schemas, tunnel_nodes_path, write_basin_assignments,
    write_basin_flows, write_basin_layers, write_basin_members, write_basin_stability,
    write_branches, write_coverage, write_cycles, write_layer_connectivity,
    write_multiplex_assignments, write_tunnel_nodes,
};
pub use restore::{restore_layer, schema_matches};
pub use writer::{write_table_atomic, OutputFormat};
