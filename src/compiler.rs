//! Scene compilation: registry contents to strided GPU buffers and atlases.
//!
//! A rebuild happens in two phases. [`SceneData::compile`] walks the registry
//! in registration order and produces plain vectors; it is the only fallible
//! step. Only if it succeeds are the vectors uploaded and the new
//! [`SceneSnapshot`] swapped in, so a reader never sees a half-built scene and
//! a failed rebuild leaves the published one untouched.
//!
//! Buffers are reused when their element count and stride match the new data
//! and replaced otherwise. A replaced buffer is dropped only after its
//! successor exists.

use instant::Instant;

use crate::{
    context::GpuAllocator,
    data_structures::{
        material::TextureRole,
        records::{MaterialRecord, MeshRecord, Vertex},
        registry::SceneRegistry,
    },
    error::CompileError,
    resources::atlas::{AtlasPolicy, TextureAtlasBuilder},
};

/// A GPU buffer together with the shape it was allocated for.
#[derive(Debug)]
pub struct StridedBuffer<B> {
    pub buffer: B,
    pub count: usize,
    pub stride: usize,
}

/// Write `data` into `previous` if the shapes match, otherwise allocate a new
/// buffer. Empty data releases the buffer.
pub fn upload_strided<G, T>(
    gpu: &G,
    previous: Option<StridedBuffer<G::Buffer>>,
    label: &str,
    data: &[T],
) -> Option<StridedBuffer<G::Buffer>>
where
    G: GpuAllocator,
    T: bytemuck::Pod,
{
    let stride = std::mem::size_of::<T>();
    if data.is_empty() {
        return None;
    }
    let contents: &[u8] = bytemuck::cast_slice(data);
    match previous {
        Some(buffer) if buffer.count == data.len() && buffer.stride == stride => {
            gpu.write_buffer(&buffer.buffer, contents);
            Some(buffer)
        }
        _ => Some(StridedBuffer {
            buffer: gpu.create_buffer(label, contents),
            count: data.len(),
            stride,
        }),
    }
}

/// The CPU result of one compile pass.
pub struct SceneData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub meshes: Vec<MeshRecord>,
    pub materials: Vec<MaterialRecord>,
    pub atlases: TextureAtlasBuilder,
}

impl SceneData {
    pub fn compile(registry: &SceneRegistry, tracer_shader: &str) -> Result<Self, CompileError> {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut meshes: Vec<MeshRecord> = Vec::new();
        let mut materials = vec![MaterialRecord::DEFAULT];
        let mut atlases = TextureAtlasBuilder::new();

        for (id, object) in registry.iter() {
            let mesh = &object.mesh;
            let aabb = mesh.bounds().ok_or(CompileError::EmptyMesh { object: id })?;
            if let Some(index) = mesh
                .indices
                .iter()
                .copied()
                .find(|index| *index as usize >= mesh.vertex_count())
            {
                return Err(CompileError::IndexOutOfRange {
                    object: id,
                    index,
                    vertex_count: mesh.vertex_count(),
                });
            }

            let material_id = match &object.material {
                Some(material) if material.is_traced_by(tracer_shader) => {
                    let mut record = material.to_record();
                    record.set_texture_indices(atlases.resolve(&material.textures));
                    materials.push(record);
                    (materials.len() - 1) as u32
                }
                _ => 0,
            };

            let overflow = CompileError::OffsetOverflow { object: id };
            let first_index = u32::try_from(indices.len()).map_err(|_| overflow.clone())?;
            let index_count = u32::try_from(mesh.indices.len()).map_err(|_| overflow.clone())?;
            first_index.checked_add(index_count).ok_or(overflow.clone())?;
            let rebased = rebase_indices(&mesh.indices, vertices.len()).ok_or(overflow)?;

            vertices.extend(mesh.vertices());
            indices.extend(rebased);

            meshes.push(MeshRecord::new(
                object.transform,
                first_index,
                index_count,
                aabb,
                material_id,
            ));
        }

        Ok(Self {
            vertices,
            indices,
            meshes,
            materials,
            atlases,
        })
    }

    /// Fail if any role has more distinct textures than `max_layers`.
    pub fn check_atlas_layers(&self, max_layers: u32) -> Result<(), CompileError> {
        for role in TextureRole::ALL {
            let members = self.atlases.members(role).len();
            if members > max_layers as usize {
                return Err(CompileError::AtlasOverflow {
                    role,
                    members,
                    limit: max_layers,
                });
            }
        }
        Ok(())
    }
}

/// Offset a mesh's indices by the position of its first vertex in the shared
/// vertex array. `None` if an offset index does not fit into `u32`.
pub fn rebase_indices(indices: &[u32], first_vertex: usize) -> Option<Vec<u32>> {
    let first_vertex = u32::try_from(first_vertex).ok()?;
    indices
        .iter()
        .map(|index| index.checked_add(first_vertex))
        .collect()
}

/// The compiled scene as bound to the kernel. Absent buffers are `None`.
pub struct SceneSnapshot<G: GpuAllocator> {
    pub vertices: Option<StridedBuffer<G::Buffer>>,
    pub indices: Option<StridedBuffer<G::Buffer>>,
    pub meshes: Option<StridedBuffer<G::Buffer>>,
    pub materials: Option<StridedBuffer<G::Buffer>>,
    /// Indexed by [`TextureRole::index`]; empty until the first rebuild.
    pub atlases: Vec<G::TextureArray>,
    /// Number of successful rebuilds so far.
    pub generation: u64,
}

impl<G: GpuAllocator> SceneSnapshot<G> {
    pub fn empty() -> Self {
        Self {
            vertices: None,
            indices: None,
            meshes: None,
            materials: None,
            atlases: Vec::new(),
            generation: 0,
        }
    }

    pub fn atlas(&self, role: TextureRole) -> Option<&G::TextureArray> {
        self.atlases.get(role.index())
    }

    /// True when no scene buffer is allocated.
    pub fn is_released(&self) -> bool {
        self.vertices.is_none()
            && self.indices.is_none()
            && self.meshes.is_none()
            && self.materials.is_none()
    }
}

pub struct SceneCompiler<G: GpuAllocator> {
    tracer_shader: String,
    atlas_policy: AtlasPolicy,
    snapshot: SceneSnapshot<G>,
}

impl<G: GpuAllocator> SceneCompiler<G> {
    pub fn new(tracer_shader: &str, atlas_policy: AtlasPolicy) -> Self {
        Self {
            tracer_shader: tracer_shader.to_string(),
            atlas_policy,
            snapshot: SceneSnapshot::empty(),
        }
    }

    pub fn snapshot(&self) -> &SceneSnapshot<G> {
        &self.snapshot
    }

    /// Rebuild if the registry reports changes. Returns the new snapshot, or
    /// `None` if nothing changed.
    ///
    /// The dirty flag is consumed even if the rebuild fails; the next mutation
    /// of the registry triggers the retry.
    pub fn rebuild_if_dirty(
        &mut self,
        gpu: &G,
        registry: &mut SceneRegistry,
    ) -> Result<Option<&SceneSnapshot<G>>, CompileError> {
        if !registry.is_dirty() {
            return Ok(None);
        }
        registry.clear_dirty();

        let start = Instant::now();
        let compiled = SceneData::compile(registry, &self.tracer_shader).and_then(|data| {
            data.check_atlas_layers(gpu.max_texture_array_layers())?;
            Ok(data)
        });
        let data = match compiled {
            Ok(data) => data,
            Err(e) => {
                log::error!("Scene rebuild aborted, keeping the previous scene: {}", e);
                return Err(e);
            }
        };
        self.publish(gpu, data, registry.is_empty());
        log::info!(
            "Rebuilt scene: {} objects, {} vertices, {} indices, {} materials in {:?}",
            self.snapshot.meshes.as_ref().map_or(0, |b| b.count),
            self.snapshot.vertices.as_ref().map_or(0, |b| b.count),
            self.snapshot.indices.as_ref().map_or(0, |b| b.count),
            self.snapshot.materials.as_ref().map_or(0, |b| b.count),
            start.elapsed()
        );
        Ok(Some(&self.snapshot))
    }

    fn publish(&mut self, gpu: &G, data: SceneData, no_objects: bool) {
        let previous = std::mem::replace(&mut self.snapshot, SceneSnapshot::empty());
        let generation = previous.generation + 1;

        let next = if no_objects {
            // Releases everything, the default material included.
            SceneSnapshot {
                atlases: self.upload_atlases(gpu, &data.atlases),
                generation,
                ..SceneSnapshot::empty()
            }
        } else {
            SceneSnapshot {
                vertices: upload_strided(gpu, previous.vertices, "Vertex Buffer", &data.vertices),
                indices: upload_strided(gpu, previous.indices, "Index Buffer", &data.indices),
                meshes: upload_strided(gpu, previous.meshes, "Mesh Record Buffer", &data.meshes),
                materials: upload_strided(
                    gpu,
                    previous.materials,
                    "Material Buffer",
                    &data.materials,
                ),
                atlases: self.upload_atlases(gpu, &data.atlases),
                generation,
            }
        };
        self.snapshot = next;
    }

    fn upload_atlases(&self, gpu: &G, atlases: &TextureAtlasBuilder) -> Vec<G::TextureArray> {
        TextureRole::ALL
            .iter()
            .map(|role| {
                let image = atlases.image(*role, &self.atlas_policy);
                log::debug!(
                    "{}: {} layers at {}x{}",
                    role.label(),
                    image.layer_count(),
                    image.size,
                    image.size
                );
                gpu.create_texture_array(&image)
            })
            .collect()
    }
}
