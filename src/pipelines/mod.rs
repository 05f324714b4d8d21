//! Compute pipelines: the external tracing kernel and the tile blend pass.

pub mod accumulate;
pub mod tracer;
