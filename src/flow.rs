//! Per-frame driver.
//!
//! [`PathTracer`] ties the scene registry, the scene compiler, the tile
//! scheduler and the renderer together. The host calls [`PathTracer::tick`]
//! once per frame with the current camera, light and viewport.
//!
//! # Tick
//!
//! Each tick follows this pattern:
//! 1. Adopt a changed viewport size (new accumulation images, new downsample level)
//! 2. Invalidate accumulation if the camera or light moved
//! 3. Rebuild the scene if the registry is dirty, invalidating and clearing on success
//! 4. Dispatch the kernel for the current tile and blend it into the accumulation image
//! 5. Advance the tile cursor, reallocating the target image when the level drops
//!
//! Registry mutations between ticks only mark the scene dirty.

use cgmath::{Matrix4, SquareMatrix, Vector3};
use turborand::prelude::*;
use wgpu::util::DeviceExt;

use crate::{
    compiler::{SceneCompiler, SceneSnapshot},
    config::TracerConfig,
    context::Context,
    data_structures::{
        material::TextureHandle,
        records::{Sphere, TracerUniform},
        registry::{ObjectId, SceneRegistry, TracedObject},
        texture::Texture,
    },
    error::CompileError,
    pipelines::tracer::TracerKernel,
    render::{Renderer, TickResources},
    resources::primitives::generate_spheres,
    scheduler::{Advance, ProgressiveScheduler, TileDispatch},
};

/// Camera, light and viewport state of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInput {
    pub viewport: [u32; 2],
    pub camera_to_world: Matrix4<f32>,
    pub inverse_projection: Matrix4<f32>,
    /// Direction the directional light shines in.
    pub light_forward: Vector3<f32>,
    pub light_intensity: f32,
}

impl FrameInput {
    pub fn new(viewport: [u32; 2]) -> Self {
        Self {
            viewport,
            camera_to_world: Matrix4::identity(),
            inverse_projection: Matrix4::identity(),
            light_forward: Vector3::new(0.0, -1.0, 0.0),
            light_intensity: 1.0,
        }
    }

    fn view_changed(&self, other: &FrameInput) -> bool {
        self.camera_to_world != other.camera_to_world
            || self.inverse_projection != other.inverse_projection
            || self.light_forward != other.light_forward
            || self.light_intensity != other.light_intensity
    }
}

/// What a tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Generation of the snapshot published by this tick's rebuild.
    pub rebuilt: Option<u64>,
    pub rebuild_error: Option<CompileError>,
    pub invalidated: bool,
    pub dispatch: Option<TileDispatch>,
    pub advance: Advance,
}

pub struct PathTracer {
    config: TracerConfig,
    registry: SceneRegistry,
    compiler: SceneCompiler<Context>,
    scheduler: ProgressiveScheduler,
    renderer: Renderer,
    spheres: Vec<Sphere>,
    sphere_buffer: Option<wgpu::Buffer>,
    skybox: Option<Texture>,
    rng: Rng,
    previous: Option<FrameInput>,
}

impl PathTracer {
    pub fn new(ctx: &Context, config: TracerConfig, kernel: TracerKernel, viewport: [u32; 2]) -> Self {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };

        let scheduler = ProgressiveScheduler::new(&config, viewport);
        let renderer = Renderer::new(ctx, kernel, scheduler.target_size(), viewport);
        let spheres = generate_spheres(&config.spheres);
        let sphere_buffer = create_sphere_buffer(ctx, &spheres);
        log::info!(
            "Path tracer at {}x{}, tile {:?}, downsample level {}",
            viewport[0],
            viewport[1],
            scheduler.tile_extent(),
            scheduler.level()
        );

        Self {
            compiler: SceneCompiler::new(&config.tracer_shader, config.atlas.clone()),
            registry: SceneRegistry::new(),
            rng: Rng::with_seed(config.seed),
            config,
            scheduler,
            renderer,
            spheres,
            sphere_buffer,
            skybox: None,
            previous: None,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    /// Direct access for batched edits. Every mutating registry call marks
    /// the scene dirty.
    pub fn registry_mut(&mut self) -> &mut SceneRegistry {
        &mut self.registry
    }

    pub fn register(&mut self, object: TracedObject) -> ObjectId {
        self.registry.register(object)
    }

    pub fn unregister(&mut self, id: ObjectId) -> Option<TracedObject> {
        self.registry.unregister(id)
    }

    /// Force a rebuild on the next tick, e.g. after editing a mesh in place.
    pub fn mark_dirty(&mut self) {
        self.registry.mark_dirty();
    }

    pub fn scheduler(&self) -> &ProgressiveScheduler {
        &self.scheduler
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn snapshot(&self) -> &SceneSnapshot<Context> {
        self.compiler.snapshot()
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Replace the generated spheres with a new set from `seed`.
    pub fn regenerate_spheres(&mut self, ctx: &Context, seed: u64) {
        self.config.spheres.seed = seed;
        self.spheres = generate_spheres(&self.config.spheres);
        self.sphere_buffer = create_sphere_buffer(ctx, &self.spheres);
        self.restart(ctx);
    }

    pub fn set_skybox(&mut self, ctx: &Context, skybox: Option<&TextureHandle>) {
        self.skybox = skybox.map(|handle| Texture::from_handle(&ctx.device, &ctx.queue, handle));
        self.restart(ctx);
    }

    /// Drop all accumulated samples.
    fn restart(&mut self, ctx: &Context) {
        self.scheduler.invalidate();
        self.renderer.clear_accumulation(ctx, self.scheduler.viewport());
    }

    pub fn tick(&mut self, ctx: &Context, input: &FrameInput) -> TickReport {
        let mut report = TickReport::default();

        if input.viewport != self.scheduler.viewport() {
            self.scheduler.resize(input.viewport);
            if self.scheduler.is_degenerate() {
                log::warn!(
                    "Viewport {}x{} is empty, nothing will be dispatched",
                    input.viewport[0],
                    input.viewport[1]
                );
            }
            self.renderer.clear_accumulation(ctx, input.viewport);
            self.renderer.resize_target(ctx, self.scheduler.target_size());
            report.invalidated = true;
        } else if self
            .previous
            .is_some_and(|previous| previous.view_changed(input))
        {
            self.scheduler.invalidate();
            report.invalidated = true;
        }
        self.previous = Some(*input);

        match self.compiler.rebuild_if_dirty(ctx, &mut self.registry) {
            Ok(Some(snapshot)) => {
                report.rebuilt = Some(snapshot.generation);
                report.invalidated = true;
                self.restart(ctx);
            }
            Ok(None) => (),
            Err(e) => report.rebuild_error = Some(e),
        }

        let Some((dispatch, advance)) = self.scheduler.tick() else {
            return report;
        };

        let jitter = [self.rng.f32(), self.rng.f32()];
        let uniform = TracerUniform {
            camera_to_world: input.camera_to_world.into(),
            camera_inverse_projection: input.inverse_projection.into(),
            directional_light: [
                input.light_forward.x,
                input.light_forward.y,
                input.light_forward.z,
                input.light_intensity,
            ],
            pixel_offset: dispatch.jittered_offset(jitter),
            seed: self.rng.f32(),
            sample: dispatch.sample as f32,
            hdr_intensity: self.config.hdr_intensity.clamp(0.0, 5.0),
            _padding: [0.0; 3],
        };
        let resources = TickResources {
            scene: self.compiler.snapshot(),
            spheres: self.sphere_buffer.as_ref(),
            skybox: self.skybox.as_ref(),
        };
        self.renderer.execute(ctx, &resources, &dispatch, &uniform);

        if let Some(size) = advance.target_resized {
            self.renderer.resize_target(ctx, size);
        }
        report.dispatch = Some(dispatch);
        report.advance = advance;
        report
    }
}

fn create_sphere_buffer(ctx: &Context, spheres: &[Sphere]) -> Option<wgpu::Buffer> {
    if spheres.is_empty() {
        return None;
    }
    Some(
        ctx.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sphere Buffer"),
                contents: bytemuck::cast_slice(spheres),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
    )
}
