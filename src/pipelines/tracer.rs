//! Bind layout and pipeline of the tracing kernel.
//!
//! The kernel itself is external WGSL. Its bindings are fixed:
//!
//! - group 0: `0` result image (`rgba32float`, write), `1` [`TracerUniform`]
//! - group 1: `0` spheres, `1` mesh records, `2` vertices, `3` indices, `4` materials
//! - group 2: `0..=4` albedo, emission, metallic, normal, roughness atlases,
//!   `5` skybox, `6` sampler
//!
//! Resources that are absent (an empty scene has no mesh buffers, a scene
//! without skybox has no skybox) are left out of the layout instead of being
//! bound as empty placeholders. The pipeline is therefore built per
//! [`BindingMask`] and the kernel source is requested for that mask, so the
//! kernel can drop the declarations it cannot use.
//!
//! [`TracerUniform`]: crate::data_structures::records::TracerUniform

use std::{collections::HashMap, fmt};

use crate::data_structures::{material::TextureRole, texture::HDR_FORMAT};

/// Which optional kernel resources are present.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindingMask(u32);

impl BindingMask {
    pub const SPHERES: BindingMask = BindingMask(1 << 0);
    pub const MESHES: BindingMask = BindingMask(1 << 1);
    pub const VERTICES: BindingMask = BindingMask(1 << 2);
    pub const INDICES: BindingMask = BindingMask(1 << 3);
    pub const MATERIALS: BindingMask = BindingMask(1 << 4);
    pub const SKYBOX: BindingMask = BindingMask(1 << 10);

    /// Scene buffers in group 1 binding order.
    pub const SCENE_BUFFERS: [BindingMask; 5] = [
        Self::SPHERES,
        Self::MESHES,
        Self::VERTICES,
        Self::INDICES,
        Self::MATERIALS,
    ];

    pub fn empty() -> Self {
        BindingMask(0)
    }

    pub fn atlas(role: TextureRole) -> Self {
        BindingMask(1 << (5 + role.index()))
    }

    pub fn contains(self, other: BindingMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BindingMask) {
        self.0 |= other.0;
    }

    pub fn with(mut self, other: BindingMask, present: bool) -> Self {
        if present {
            self.insert(other);
        }
        self
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BindingMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingMask({:#013b})", self.0)
    }
}

/// Binding index of the sampler in group 2.
pub const SAMPLER_BINDING: u32 = 6;
/// Binding index of the skybox in group 2.
pub const SKYBOX_BINDING: u32 = 5;

/// The external tracing kernel.
pub struct TracerKernel {
    /// Produces WGSL for the given set of present bindings.
    pub source: Box<dyn Fn(BindingMask) -> String>,
    pub entry_point: String,
}

impl TracerKernel {
    pub fn new(source: impl Fn(BindingMask) -> String + 'static, entry_point: &str) -> Self {
        Self {
            source: Box::new(source),
            entry_point: entry_point.to_string(),
        }
    }

    /// A kernel whose source does not depend on the binding set.
    pub fn from_wgsl(source: &str, entry_point: &str) -> Self {
        let source = source.to_string();
        Self::new(move |_| source.clone(), entry_point)
    }
}

pub struct TracerPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub output_layout: wgpu::BindGroupLayout,
    pub scene_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

pub fn output_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("tracer_output_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: HDR_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

pub fn scene_layout(device: &wgpu::Device, mask: BindingMask) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = BindingMask::SCENE_BUFFERS
        .iter()
        .enumerate()
        .filter(|(_, slot)| mask.contains(**slot))
        .map(|(binding, _)| storage_entry(binding as u32))
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("tracer_scene_bind_group_layout"),
        entries: &entries,
    })
}

/// The sampler is only part of the layout if at least one texture is.
pub fn texture_layout(device: &wgpu::Device, mask: BindingMask) -> wgpu::BindGroupLayout {
    let mut entries: Vec<_> = TextureRole::ALL
        .iter()
        .filter(|role| mask.contains(BindingMask::atlas(**role)))
        .map(|role| texture_entry(role.index() as u32, wgpu::TextureViewDimension::D2Array))
        .collect();
    if mask.contains(BindingMask::SKYBOX) {
        entries.push(texture_entry(SKYBOX_BINDING, wgpu::TextureViewDimension::D2));
    }
    if !entries.is_empty() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("tracer_texture_bind_group_layout"),
        entries: &entries,
    })
}

pub fn mk_tracer_pipeline(
    device: &wgpu::Device,
    kernel: &TracerKernel,
    mask: BindingMask,
) -> TracerPipeline {
    let output_layout = output_layout(device);
    let scene_layout = scene_layout(device, mask);
    let texture_layout = texture_layout(device, mask);

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("tracer_pipeline_layout"),
        bind_group_layouts: &[&output_layout, &scene_layout, &texture_layout],
        immediate_size: 0,
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("tracer_kernel"),
        source: wgpu::ShaderSource::Wgsl((kernel.source)(mask).into()),
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("tracer_pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some(&kernel.entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    TracerPipeline {
        pipeline,
        output_layout,
        scene_layout,
        texture_layout,
    }
}

/// Kernel pipelines keyed by binding set. A scene usually alternates between
/// very few masks, so every pipeline is built once and kept.
pub struct TracerPipelines {
    kernel: TracerKernel,
    pipelines: HashMap<BindingMask, TracerPipeline>,
}

impl TracerPipelines {
    pub fn new(kernel: TracerKernel) -> Self {
        Self {
            kernel,
            pipelines: HashMap::new(),
        }
    }

    pub fn get(&mut self, device: &wgpu::Device, mask: BindingMask) -> &TracerPipeline {
        self.pipelines.entry(mask).or_insert_with(|| {
            log::info!("Building tracer pipeline for {:?}", mask);
            mk_tracer_pipeline(device, &self.kernel, mask)
        })
    }
}
