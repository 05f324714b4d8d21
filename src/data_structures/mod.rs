//! Tracer data structures: GPU records, meshes, materials, the scene registry
//! and textures.
//!
//! - `records` holds the `#[repr(C)]` structs uploaded to the kernel
//! - `mesh` contains CPU mesh data and bounding boxes
//! - `material` describes materials and the textures they reference
//! - `registry` is the set of traced objects and its dirty flag
//! - `texture` contains GPU texture wrappers

pub mod material;
pub mod mesh;
pub mod records;
pub mod registry;
pub mod texture;
