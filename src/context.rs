//! GPU context and the allocation seam of the scene compiler.
//!
//! [`Context`] owns the wgpu device and queue. The tracer never presents to a
//! surface itself, so the context is created headless; hosts that already own
//! a device can wrap it with [`Context::from_device`].
//!
//! [`GpuAllocator`] is the small set of resource operations the compiler
//! performs. `Context` implements it with wgpu, tests implement it with a
//! recording fake.

use wgpu::util::DeviceExt;

use crate::{data_structures::texture::TextureArray, resources::atlas::AtlasImage};

/// Resource creation as seen by the scene compiler.
///
/// Releasing a resource is dropping it.
pub trait GpuAllocator {
    type Buffer;
    type TextureArray;

    /// Create a storage buffer initialised with `contents`. Never called with
    /// empty contents.
    fn create_buffer(&self, label: &str, contents: &[u8]) -> Self::Buffer;

    /// Overwrite an existing buffer of exactly `contents.len()` bytes.
    fn write_buffer(&self, buffer: &Self::Buffer, contents: &[u8]);

    fn create_texture_array(&self, atlas: &AtlasImage) -> Self::TextureArray;

    /// Upper bound on the layers of one texture array.
    fn max_texture_array_layers(&self) -> u32;
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Context {
    /// Request a headless adapter and device.
    pub async fn new() -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("trace-ngin device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self { device, queue })
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl GpuAllocator for Context {
    type Buffer = wgpu::Buffer;
    type TextureArray = TextureArray;

    fn create_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, contents: &[u8]) {
        // Ordered before the next submission, in-flight work still sees the old data.
        self.queue.write_buffer(buffer, 0, contents);
    }

    fn create_texture_array(&self, atlas: &AtlasImage) -> TextureArray {
        TextureArray::from_atlas(&self.device, &self.queue, atlas)
    }

    fn max_texture_array_layers(&self) -> u32 {
        self.device.limits().max_texture_array_layers
    }
}
