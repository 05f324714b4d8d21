//! GPU execution of scheduled tiles.
//!
//! The [`Renderer`] owns everything the scheduler writes to: the kernel's
//! result image (at the downsampled target size), the pair of accumulation
//! images (at viewport size) and the uniform buffers. Each
//! [`Renderer::execute`] records the kernel dispatch for one tile followed by
//! the blend of that tile into the accumulation image and submits both in one
//! command buffer. Ordering between the two passes is the queue's; the CPU
//! never waits for a tick to finish.

use wgpu::util::DeviceExt;

use crate::{
    compiler::SceneSnapshot,
    context::{Context, GpuAllocator},
    data_structures::{
        material::TextureRole,
        records::TracerUniform,
        texture::{StorageImage, Texture, create_default_sampler},
    },
    pipelines::{
        accumulate::{BlendPipeline, BlendUniform, blend_workgroups, mk_blend_pipeline},
        tracer::{BindingMask, SAMPLER_BINDING, SKYBOX_BINDING, TracerKernel, TracerPipelines},
    },
    scheduler::TileDispatch,
};

const HDR_BYTES_PER_PIXEL: u32 = 16;

/// The set of kernel bindings a tick can provide.
pub fn binding_mask<G: GpuAllocator>(
    scene: &SceneSnapshot<G>,
    has_spheres: bool,
    has_skybox: bool,
) -> BindingMask {
    let mut mask = BindingMask::empty()
        .with(BindingMask::SPHERES, has_spheres)
        .with(BindingMask::MESHES, scene.meshes.is_some())
        .with(BindingMask::VERTICES, scene.vertices.is_some())
        .with(BindingMask::INDICES, scene.indices.is_some())
        .with(BindingMask::MATERIALS, scene.materials.is_some())
        .with(BindingMask::SKYBOX, has_skybox);
    for role in TextureRole::ALL {
        mask = mask.with(BindingMask::atlas(role), scene.atlas(role).is_some());
    }
    mask
}

/// Resources bound for one tick besides the compiled scene.
pub struct TickResources<'a> {
    pub scene: &'a SceneSnapshot<Context>,
    pub spheres: Option<&'a wgpu::Buffer>,
    pub skybox: Option<&'a Texture>,
}

pub struct Renderer {
    pipelines: TracerPipelines,
    blend: BlendPipeline,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    blend_buffer: wgpu::Buffer,
    target: StorageImage,
    accumulation: [StorageImage; 2],
    /// Index of the accumulation image holding the latest result.
    front: usize,
}

impl Renderer {
    pub fn new(
        ctx: &Context,
        kernel: TracerKernel,
        target_size: [u32; 2],
        viewport: [u32; 2],
    ) -> Self {
        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tracer Uniform Buffer"),
                contents: bytemuck::bytes_of(&TracerUniform::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let blend_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Blend Uniform Buffer"),
                contents: bytemuck::bytes_of(&BlendUniform::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        Self {
            pipelines: TracerPipelines::new(kernel),
            blend: mk_blend_pipeline(&ctx.device),
            sampler: create_default_sampler(&ctx.device),
            uniform_buffer,
            blend_buffer,
            target: StorageImage::new(&ctx.device, target_size, "Tracer Target"),
            accumulation: Self::accumulation_pair(&ctx.device, viewport),
            front: 0,
        }
    }

    fn accumulation_pair(device: &wgpu::Device, viewport: [u32; 2]) -> [StorageImage; 2] {
        [
            StorageImage::new(device, viewport, "Accumulation A"),
            StorageImage::new(device, viewport, "Accumulation B"),
        ]
    }

    pub fn target(&self) -> &StorageImage {
        &self.target
    }

    /// The accumulation image holding the latest blended result.
    pub fn accumulation(&self) -> &StorageImage {
        &self.accumulation[self.front]
    }

    /// Reallocate the kernel's result image, e.g. after the downsample level
    /// dropped.
    pub fn resize_target(&mut self, ctx: &Context, size: [u32; 2]) {
        if [self.target.width, self.target.height] == size.map(|v| v.max(1)) {
            return;
        }
        self.target = StorageImage::new(&ctx.device, size, "Tracer Target");
    }

    /// Recreate the accumulation images at `viewport` size. New textures are
    /// zero-initialised.
    pub fn clear_accumulation(&mut self, ctx: &Context, viewport: [u32; 2]) {
        self.accumulation = Self::accumulation_pair(&ctx.device, viewport);
        self.front = 0;
    }

    /// Record and submit the kernel dispatch and the blend for one tile.
    pub fn execute(
        &mut self,
        ctx: &Context,
        resources: &TickResources<'_>,
        dispatch: &TileDispatch,
        uniform: &TracerUniform,
    ) {
        let device = &ctx.device;
        let mask = binding_mask(
            resources.scene,
            resources.spheres.is_some(),
            resources.skybox.is_some(),
        );
        let tracer = self.pipelines.get(device, mask);

        ctx.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniform));
        ctx.queue.write_buffer(
            &self.blend_buffer,
            0,
            bytemuck::bytes_of(&BlendUniform::from_dispatch(dispatch)),
        );

        let output_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_output_bind_group"),
            layout: &tracer.output_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let scene = resources.scene;
        let buffers = [
            resources.spheres,
            scene.meshes.as_ref().map(|b| &b.buffer),
            scene.vertices.as_ref().map(|b| &b.buffer),
            scene.indices.as_ref().map(|b| &b.buffer),
            scene.materials.as_ref().map(|b| &b.buffer),
        ];
        let scene_entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .filter_map(|(binding, buffer)| {
                buffer.map(|buffer| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
            })
            .collect();
        let scene_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_scene_bind_group"),
            layout: &tracer.scene_layout,
            entries: &scene_entries,
        });

        let mut texture_entries: Vec<_> = TextureRole::ALL
            .iter()
            .filter_map(|role| {
                scene.atlas(*role).map(|atlas| wgpu::BindGroupEntry {
                    binding: role.index() as u32,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                })
            })
            .collect();
        if let Some(skybox) = resources.skybox {
            texture_entries.push(wgpu::BindGroupEntry {
                binding: SKYBOX_BINDING,
                resource: wgpu::BindingResource::TextureView(&skybox.view),
            });
        }
        if !texture_entries.is_empty() {
            texture_entries.push(wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        let texture_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_texture_bind_group"),
            layout: &tracer.texture_layout,
            entries: &texture_entries,
        });

        let back = 1 - self.front;
        let blend_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blend_bind_group"),
            layout: &self.blend.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &self.accumulation[self.front].view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.accumulation[back].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.blend_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tracer Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Tracer Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&tracer.pipeline);
            pass.set_bind_group(0, &output_group, &[]);
            pass.set_bind_group(1, &scene_group, &[]);
            pass.set_bind_group(2, &texture_group, &[]);
            pass.dispatch_workgroups(dispatch.workgroups[0], dispatch.workgroups[1], 1);
        }
        {
            let accumulation = &self.accumulation[back];
            let [x, y] = blend_workgroups([accumulation.width, accumulation.height]);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Blend Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.blend.pipeline);
            pass.set_bind_group(0, &blend_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        self.front = back;
    }

    /// Copy the latest accumulation image back to the CPU. Blocks until the
    /// GPU has finished all submitted work.
    pub async fn read_accumulation(&self, ctx: &Context) -> anyhow::Result<image::Rgba32FImage> {
        let image = self.accumulation();
        let (width, height) = (image.width, image.height);
        let unpadded_row = width * HDR_BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = unpadded_row.div_ceil(align) * align;

        let output_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Accumulation Readback"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        // The mapping has to be requested before polling, otherwise the
        // receive below never resolves.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if tx.send(result).is_err() {
                log::warn!("Readback receiver dropped before the mapping finished");
            }
        });
        ctx.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.receive()
            .await
            .ok_or_else(|| anyhow::anyhow!("Readback channel closed"))??;

        let pixels: Vec<f32> = {
            let data = buffer_slice.get_mapped_range();
            data.chunks_exact(padded_row as usize)
                .flat_map(|row| row[..unpadded_row as usize].chunks_exact(4))
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect()
        };
        output_buffer.unmap();

        image::Rgba32FImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow::anyhow!("Readback of {}x{} returned too few pixels", width, height))
    }
}
