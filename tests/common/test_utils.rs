use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use cgmath::Matrix4;
use trace_ngin::{
    context::GpuAllocator,
    data_structures::{
        material::{MaterialDescriptor, TextureRole},
        mesh::MeshData,
        registry::TracedObject,
    },
    resources::atlas::AtlasImage,
};

/// Shared counters of a [`RecordingAllocator`]. Buffers keep a reference so
/// that dropping them is counted as a release.
#[derive(Default, Debug)]
pub(crate) struct Counters {
    pub created: Cell<usize>,
    pub written: Cell<usize>,
    pub released: Cell<usize>,
    pub texture_arrays: Cell<usize>,
}

impl Counters {
    pub fn live(&self) -> usize {
        self.created.get() - self.released.get()
    }
}

#[derive(Debug)]
pub(crate) struct FakeBuffer {
    pub id: usize,
    pub label: String,
    pub contents: RefCell<Vec<u8>>,
    counters: Rc<Counters>,
}

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        self.counters.released.set(self.counters.released.get() + 1);
    }
}

#[derive(Debug)]
pub(crate) struct FakeTextureArray {
    pub role: TextureRole,
    pub size: u32,
    pub layers: u32,
}

/// A `GpuAllocator` that keeps everything on the CPU and counts calls.
pub(crate) struct RecordingAllocator {
    pub counters: Rc<Counters>,
    pub max_layers: u32,
}

impl RecordingAllocator {
    /// Same layer limit as `wgpu::Limits::default()`.
    pub fn new() -> Self {
        Self::with_max_layers(256)
    }

    pub fn with_max_layers(max_layers: u32) -> Self {
        Self {
            counters: Rc::default(),
            max_layers,
        }
    }
}

impl GpuAllocator for RecordingAllocator {
    type Buffer = FakeBuffer;
    type TextureArray = FakeTextureArray;

    fn create_buffer(&self, label: &str, contents: &[u8]) -> FakeBuffer {
        assert!(!contents.is_empty(), "{} created empty", label);
        let id = self.counters.created.get();
        self.counters.created.set(id + 1);
        FakeBuffer {
            id,
            label: label.to_string(),
            contents: RefCell::new(contents.to_vec()),
            counters: self.counters.clone(),
        }
    }

    fn write_buffer(&self, buffer: &FakeBuffer, contents: &[u8]) {
        assert_eq!(buffer.contents.borrow().len(), contents.len());
        buffer.contents.replace(contents.to_vec());
        self.counters.written.set(self.counters.written.get() + 1);
    }

    fn create_texture_array(&self, atlas: &AtlasImage) -> FakeTextureArray {
        self.counters
            .texture_arrays
            .set(self.counters.texture_arrays.get() + 1);
        FakeTextureArray {
            role: atlas.role,
            size: atlas.size,
            layers: atlas.layer_count(),
        }
    }

    fn max_texture_array_layers(&self) -> u32 {
        self.max_layers
    }
}

pub(crate) fn triangle() -> MeshData {
    MeshData::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![0, 1, 2],
    )
}

pub(crate) fn quad() -> MeshData {
    MeshData::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

pub(crate) fn object(mesh: MeshData) -> TracedObject {
    TracedObject::new(mesh.into_shared())
}

pub(crate) fn traced(mesh: MeshData, material: MaterialDescriptor) -> TracedObject {
    object(mesh).with_material(material)
}

pub(crate) fn translated(mesh: MeshData, x: f32) -> TracedObject {
    object(mesh).with_transform(Matrix4::from_translation([x, 0.0, 0.0].into()))
}

/// A kernel that paints its tile with the WGSL expression `colour`, which may
/// read `tracer` (the uniform) and `result`. Only uses group 0, which is always
/// bound.
pub(crate) fn painting_kernel(colour: &str) -> String {
    format!(
        r#"
struct TracerUniform {{
    camera_to_world: mat4x4<f32>,
    camera_inverse_projection: mat4x4<f32>,
    directional_light: vec4<f32>,
    pixel_offset: vec2<f32>,
    seed: f32,
    sample_count: f32,
    hdr_intensity: f32,
}}

@group(0) @binding(0) var result: texture_storage_2d<rgba32float, write>;
@group(0) @binding(1) var<uniform> tracer: TracerUniform;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    let pixel = vec2<u32>(floor(tracer.pixel_offset)) + id.xy;
    textureStore(result, vec2<i32>(pixel), {colour});
}}
"#
    )
}

pub(crate) const SOLID_COLOUR: [f32; 4] = [0.25, 0.5, 1.0, 1.0];

pub(crate) fn solid_kernel() -> String {
    painting_kernel("vec4<f32>(0.25, 0.5, 1.0, 1.0)")
}

pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build the test runtime")
        .block_on(future)
}
