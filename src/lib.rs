//! trace-ngin
//!
//! A progressive path-tracing front end on top of wgpu. The crate keeps a
//! registry of traced objects, compiles it into flat GPU buffers and texture
//! atlases whenever it changes, and drives an external WGSL tracing kernel
//! tile by tile, averaging the results into an accumulation image. Rendering
//! starts at a coarse resolution and sharpens pass by pass.
//!
//! High-level modules
//! - `config`: work budget, atlas policy and generator settings
//! - `context`: headless GPU context and the allocation seam of the compiler
//! - `data_structures`: GPU records, meshes, materials, the scene registry and textures
//! - `resources`: procedural sphere generation and texture atlas building
//! - `compiler`: registry to GPU buffers, rebuilt when dirty
//! - `scheduler`: downsample level and tile cursor bookkeeping
//! - `pipelines`: the tracing kernel pipeline and the tile blend pass
//! - `render`: GPU execution of one scheduled tile
//! - `flow`: the per-frame `PathTracer::tick`
//!

pub mod compiler;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scheduler;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
