//! GPU-layout records.
//!
//! Every type in here is copied byte-for-byte into a storage or uniform buffer
//! and read by the tracing kernel. The layouts are packed (`#[repr(C)]` with
//! only 4-byte fields) and their strides are part of the kernel contract, so
//! the `STRIDE` constants are asserted at compile time.

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::mesh::Aabb;

/// A mesh vertex as stored in the vertex buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: usize = 32;
}

/**
 * Per-object record. The transforms are snapshots taken at compile time, a
 * moving object has to be reported via `SceneRegistry::mark_dirty`.
 *
 * Field order is fixed by the kernel's struct declaration.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshRecord {
    pub local_to_world: [[f32; 4]; 4],
    pub world_to_local: [[f32; 4]; 4],
    pub indices_offset: u32,
    pub indices_count: u32,
    pub aabb_max: [f32; 3],
    pub aabb_min: [f32; 3],
    pub material_id: u32,
}

impl MeshRecord {
    pub const STRIDE: usize = 164;

    pub fn new(
        transform: Matrix4<f32>,
        indices_offset: u32,
        indices_count: u32,
        aabb: Aabb,
        material_id: u32,
    ) -> Self {
        // Degenerate transforms collapse the object, the kernel then never hits it.
        let inverse = transform.invert().unwrap_or(Matrix4::from_scale(0.0));
        Self {
            local_to_world: transform.into(),
            world_to_local: inverse.into(),
            indices_offset,
            indices_count,
            aabb_max: aabb.max,
            aabb_min: aabb.min,
            material_id,
        }
    }
}

/// Sentinel texture index for "no texture in this role".
pub const NO_TEXTURE: i32 = -1;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialRecord {
    pub color: [f32; 4],
    pub emission: [f32; 3],
    pub metallic: f32,
    pub smoothness: f32,
    pub ior: f32,
    /// `0.0` is opaque, anything above is transparent.
    pub render_mode: f32,
    pub albedo_idx: i32,
    pub emission_idx: i32,
    pub metallic_idx: i32,
    pub normal_idx: i32,
    pub roughness_idx: i32,
}

impl MaterialRecord {
    pub const STRIDE: usize = 64;

    /// Material slot 0. Objects without a tracer material point here.
    pub const DEFAULT: MaterialRecord = MaterialRecord {
        color: [1.0, 1.0, 1.0, 1.0],
        emission: [0.0; 3],
        metallic: 0.04,
        smoothness: 0.5,
        ior: 1.0,
        render_mode: 0.0,
        albedo_idx: NO_TEXTURE,
        emission_idx: NO_TEXTURE,
        metallic_idx: NO_TEXTURE,
        normal_idx: NO_TEXTURE,
        roughness_idx: NO_TEXTURE,
    };

    pub fn texture_indices(&self) -> [i32; 5] {
        [
            self.albedo_idx,
            self.emission_idx,
            self.metallic_idx,
            self.normal_idx,
            self.roughness_idx,
        ]
    }

    pub fn set_texture_indices(&mut self, indices: [i32; 5]) {
        self.albedo_idx = indices[0];
        self.emission_idx = indices[1];
        self.metallic_idx = indices[2];
        self.normal_idx = indices[3];
        self.roughness_idx = indices[4];
    }
}

impl Default for MaterialRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A procedurally placed sphere. Spheres live in their own buffer and are
/// independent of the registered meshes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Sphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub smoothness: f32,
    pub emission: [f32; 3],
}

impl Sphere {
    pub const STRIDE: usize = 56;
}

/**
 * Per-tick scalars and matrices handed to the kernel as one uniform block.
 *
 * Unlike the storage records this one follows uniform alignment rules, hence
 * the explicit padding.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TracerUniform {
    pub camera_to_world: [[f32; 4]; 4],
    pub camera_inverse_projection: [[f32; 4]; 4],
    /// xyz is the light's forward direction, w its intensity.
    pub directional_light: [f32; 4],
    pub pixel_offset: [f32; 2],
    pub seed: f32,
    pub sample: f32,
    pub hdr_intensity: f32,
    pub _padding: [f32; 3],
}

impl Default for TracerUniform {
    fn default() -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        Self {
            camera_to_world: identity,
            camera_inverse_projection: identity,
            directional_light: [0.0, -1.0, 0.0, 1.0],
            pixel_offset: [0.0; 2],
            seed: 0.0,
            sample: 0.0,
            hdr_intensity: 1.0,
            _padding: [0.0; 3],
        }
    }
}

const _: () = assert!(std::mem::size_of::<Vertex>() == Vertex::STRIDE);
const _: () = assert!(std::mem::size_of::<MeshRecord>() == MeshRecord::STRIDE);
const _: () = assert!(std::mem::size_of::<MaterialRecord>() == MaterialRecord::STRIDE);
const _: () = assert!(std::mem::size_of::<Sphere>() == Sphere::STRIDE);
const _: () = assert!(std::mem::size_of::<TracerUniform>() % 16 == 0);
