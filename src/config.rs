//! Tracer configuration.
//!
//! [`TracerConfig`] bundles the fixed work-budget constants of the tile
//! scheduler together with the knobs of the scene compiler and the sphere
//! generator. Construct it with `Default` and overwrite what you need before
//! handing it to [`crate::flow::PathTracer::new`].

use crate::resources::atlas::AtlasPolicy;

/// Tag a material must carry to be compiled as a tracer material.
pub const DEFAULT_TRACER_SHADER: &str = "RayTracingShader";

/// Parameters of the procedural sphere field.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereSettings {
    pub seed: u64,
    /// Number of candidate slots. Overlapping candidates are skipped, so the
    /// generated list is usually shorter.
    pub count: u32,
    /// Inclusive lower and exclusive upper bound of the sphere radius.
    pub radius: (f32, f32),
    /// Radius of the disk on the ground plane the spheres are placed in.
    pub placement_radius: f32,
}

impl Default for SphereSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            count: 1000,
            radius: (5.0, 30.0),
            placement_radius: 100.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Number of workgroups dispatched per tile in x and y.
    pub tile_groups: [u32; 2],
    /// Edge length of one (square) workgroup in pixels. Must match the
    /// kernel's `@workgroup_size`.
    pub group_size: u32,
    pub tracer_shader: String,
    /// Scalar forwarded to the kernel; clamped to `0.0..=5.0`.
    pub hdr_intensity: f32,
    /// Seed of the per-tick random stream (jitter and the kernel seed scalar).
    pub seed: u64,
    pub spheres: SphereSettings,
    pub atlas: AtlasPolicy,
}

impl TracerConfig {
    /// Width and height of one tile in pixels.
    pub fn tile_extent(&self) -> [u32; 2] {
        [
            self.tile_groups[0] * self.group_size,
            self.tile_groups[1] * self.group_size,
        ]
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            tile_groups: [32, 32],
            group_size: 8,
            tracer_shader: DEFAULT_TRACER_SHADER.to_string(),
            hdr_intensity: 1.0,
            seed: 0,
            spheres: SphereSettings::default(),
            atlas: AtlasPolicy::default(),
        }
    }
}
