//! basin-engine: the functional-graph kernels.
//!
//! For a fixed N the link graph collapses to a functional graph (out-degree
//! ≤ 1), which lets cycle discovery run as one linear color-walk instead of
//! a general SCC pass, and basin enumeration as a reverse BFS over the
//! inverted successor map. All kernels are pure over the shared snapshot and
//! surface errors to the caller.

mod basin;
mod bitset;
mod branch;
mod cycles;
mod reverse;
mod successor;

pub use basin::{materialize_basin, Basin, BasinOptions};
pub use bitset::BitSet;
pub use branch::{decompose_branch, dominant_chain, BranchDecomposition, ChainStep, Subtree};
pub use cycles::{classify, Classification, Cycle, CycleTable, HALT_DEPTH};
pub use reverse::ReverseCsr;
pub use successor::SuccessorMap;
