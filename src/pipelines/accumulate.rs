//! Tile blend pass.
//!
//! Reads the kernel's result image and the current accumulation image and
//! writes the running average into the other accumulation image of the pair.
//! Storage textures of `rgba32float` cannot be read and written in one pass
//! without extra adapter features, hence the ping-pong.

use bytemuck::{Pod, Zeroable};

use crate::{data_structures::texture::HDR_FORMAT, scheduler::TileDispatch};

pub const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlendUniform {
    pub mask: [f32; 4],
    pub weight: f32,
    pub _padding: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<BlendUniform>() == 32);

impl BlendUniform {
    pub fn from_dispatch(dispatch: &TileDispatch) -> Self {
        Self {
            mask: dispatch.mask(),
            weight: dispatch.blend_weight(),
            _padding: [0.0; 3],
        }
    }
}

pub fn blend_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let sampled = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("blend_bind_group_layout"),
        entries: &[
            sampled(0),
            sampled(1),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: HDR_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
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

pub struct BlendPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

pub fn mk_blend_pipeline(device: &wgpu::Device) -> BlendPipeline {
    let layout = blend_layout(device);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("blend_pipeline_layout"),
        bind_group_layouts: &[&layout],
        immediate_size: 0,
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Blend Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("accumulate.wgsl").into()),
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("blend_pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    BlendPipeline { pipeline, layout }
}

/// Workgroups covering an image of `size` pixels.
pub fn blend_workgroups(size: [u32; 2]) -> [u32; 2] {
    size.map(|v| v.div_ceil(WORKGROUP_SIZE))
}
