//! basin-api: the callable query surface over a loaded snapshot.
//!
//! Wraps the engine kernels behind an [`Engine`] facade that owns the
//! snapshot, caches per-N derived state, and remaps page ids at the
//! boundary. Any UI layer (CLI, HTTP, notebooks) talks to this crate and
//! never to the kernels directly.

mod engine;

pub use engine::{CrossTrace, Engine, LayerState, SourceChainStep, Trace, TraceTerminal};
