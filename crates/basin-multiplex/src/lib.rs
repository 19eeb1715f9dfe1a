//! basin-multiplex: the per-N basin assignments viewed as layers of one
//! structure over (page, N) pairs.
//!
//! Builds the long `(node, N) → terminal` table by running the engine at
//! each configured N, then derives the cross-N artifacts: tunnel nodes,
//! layer connectivity, basin flows, stability scores, and hyperstructure
//! coverage. Everything here is a pure function of the snapshot and N_set.

mod assignment;
mod connectivity;
mod tunnel;

pub use assignment::{LayerAssignment, MultiplexTable};
pub use connectivity::{
    basin_flows, hyperstructure_coverage, layer_connectivity, stability_scores, BasinFlow,
    Coverage, LayerMatrix, StabilityScore,
};
pub use tunnel::{find_tunnels, TunnelKind, TunnelNode};
