mod common;

use trace_ngin::{
    compiler::{SceneCompiler, SceneData, rebase_indices},
    config::DEFAULT_TRACER_SHADER,
    data_structures::{
        material::{MaterialDescriptor, TextureHandle, TextureRole},
        mesh::MeshData,
        records::MaterialRecord,
        registry::SceneRegistry,
    },
    error::CompileError,
    resources::atlas::AtlasPolicy,
};

use crate::common::test_utils::{
    RecordingAllocator, object, quad, traced, translated, triangle,
};

fn compiler() -> SceneCompiler<RecordingAllocator> {
    SceneCompiler::new(DEFAULT_TRACER_SHADER, AtlasPolicy::default())
}

#[test]
fn should_skip_clean_registries() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    let result = compiler.rebuild_if_dirty(&gpu, &mut registry);
    assert!(matches!(result, Ok(None)));
    assert_eq!(compiler.snapshot().generation, 0);
    assert_eq!(gpu.counters.created.get(), 0);
}

#[test]
fn should_offset_indices_into_the_shared_vertex_buffer() {
    let mut registry = SceneRegistry::new();
    registry.register(object(triangle()));
    registry.register(object(quad()));

    let data = SceneData::compile(&registry, DEFAULT_TRACER_SHADER).expect("compile failed");
    assert_eq!(data.vertices.len(), 7);
    assert_eq!(data.indices, vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
    assert_eq!(data.meshes[0].indices_offset, 0);
    assert_eq!(data.meshes[0].indices_count, 3);
    assert_eq!(data.meshes[1].indices_offset, 3);
    assert_eq!(data.meshes[1].indices_count, 6);
    assert!(
        data.indices
            .iter()
            .all(|index| (*index as usize) < data.vertices.len())
    );
}

#[test]
fn should_store_local_bounds() {
    let mesh = MeshData::new(
        vec![[0.0, 0.0, 0.0], [1.0, 2.0, 0.0], [-1.0, 0.0, 3.0]],
        vec![0, 1, 2],
    );
    let mut registry = SceneRegistry::new();
    registry.register(translated(mesh, 10.0));

    let data = SceneData::compile(&registry, DEFAULT_TRACER_SHADER).expect("compile failed");
    assert_eq!(data.meshes[0].aabb_min, [-1.0, 0.0, 0.0]);
    assert_eq!(data.meshes[0].aabb_max, [1.0, 2.0, 3.0]);
    assert_eq!(data.meshes[0].local_to_world[3][0], 10.0);
    assert_eq!(data.meshes[0].world_to_local[3][0], -10.0);
}

#[test]
fn should_seed_the_default_material() {
    let mut registry = SceneRegistry::new();
    registry.register(object(triangle()));
    registry.register(traced(
        triangle(),
        MaterialDescriptor::new([1.0, 0.0, 0.0, 1.0]).with_shader("Standard"),
    ));
    registry.register(traced(triangle(), MaterialDescriptor::new([0.0, 1.0, 0.0, 1.0])));

    let data = SceneData::compile(&registry, DEFAULT_TRACER_SHADER).expect("compile failed");
    assert_eq!(data.materials.len(), 2);
    assert_eq!(data.materials[0], MaterialRecord::DEFAULT);
    let ids: Vec<u32> = data.meshes.iter().map(|m| m.material_id).collect();
    assert_eq!(ids, vec![0, 0, 1]);
    assert_eq!(data.materials[1].color, [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(data.materials[1].ior, 1.0);
    assert_eq!(data.materials[1].emission, [0.0; 3]);
}

#[test]
fn should_resolve_material_textures_through_the_atlas() {
    let albedo = TextureHandle::solid(8, 8, [255, 0, 0, 255]);
    let normal = TextureHandle::solid(8, 8, [128, 128, 255, 255]);
    let mut registry = SceneRegistry::new();
    registry.register(traced(
        triangle(),
        MaterialDescriptor::new([1.0; 4]).with_texture(TextureRole::Albedo, albedo.clone()),
    ));
    registry.register(traced(
        quad(),
        MaterialDescriptor::new([1.0; 4])
            .with_texture(TextureRole::Albedo, albedo)
            .with_texture(TextureRole::Normal, normal),
    ));

    let data = SceneData::compile(&registry, DEFAULT_TRACER_SHADER).expect("compile failed");
    assert_eq!(data.materials[1].texture_indices(), [0, -1, -1, -1, -1]);
    assert_eq!(data.materials[2].texture_indices(), [0, -1, -1, 0, -1]);
    assert_eq!(data.atlases.members(TextureRole::Albedo).len(), 1);
}

#[test]
fn should_reject_empty_meshes_and_keep_the_published_scene() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    registry.register(object(triangle()));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("first rebuild failed");
    let created = gpu.counters.created.get();

    let empty = registry.register(object(MeshData::default()));
    let result = compiler.rebuild_if_dirty(&gpu, &mut registry);
    assert_eq!(result.err(), Some(CompileError::EmptyMesh { object: empty }));

    let snapshot = compiler.snapshot();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.meshes.as_ref().map(|b| b.count), Some(1));
    assert_eq!(gpu.counters.created.get(), created);
    assert_eq!(gpu.counters.released.get(), 0);
    // The failed pass consumed the request.
    assert!(!registry.is_dirty());
}

#[test]
fn should_reject_indices_outside_the_mesh() {
    let mut registry = SceneRegistry::new();
    let bad = registry.register(object(MeshData::new(
        vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![0, 1, 3],
    )));
    let result = SceneData::compile(&registry, DEFAULT_TRACER_SHADER);
    assert_eq!(
        result.err(),
        Some(CompileError::IndexOutOfRange {
            object: bad,
            index: 3,
            vertex_count: 3
        })
    );
}

#[test]
fn should_rewrite_buffers_of_unchanged_shape() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    let id = registry.register(traced(triangle(), MaterialDescriptor::new([1.0; 4])));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("first rebuild failed");
    assert_eq!(gpu.counters.created.get(), 4);
    let vertex_id = compiler.snapshot().vertices.as_ref().map(|b| b.buffer.id);

    registry.set_transform(id, cgmath::Matrix4::from_scale(3.0));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("second rebuild failed");
    assert_eq!(gpu.counters.created.get(), 4);
    assert_eq!(gpu.counters.written.get(), 4);
    assert_eq!(gpu.counters.released.get(), 0);
    assert_eq!(
        compiler.snapshot().vertices.as_ref().map(|b| b.buffer.id),
        vertex_id
    );
    assert_eq!(compiler.snapshot().generation, 2);
}

#[test]
fn should_reallocate_buffers_whose_count_changed() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    registry.register(object(triangle()));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("first rebuild failed");

    registry.register(object(quad()));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("second rebuild failed");

    // Vertices, indices and mesh records grew. The single default material did not.
    assert_eq!(gpu.counters.created.get(), 4 + 3);
    assert_eq!(gpu.counters.released.get(), 3);
    assert_eq!(gpu.counters.written.get(), 1);
    assert_eq!(gpu.counters.live(), 4);

    let snapshot = compiler.snapshot();
    assert_eq!(snapshot.vertices.as_ref().map(|b| b.count), Some(7));
    assert_eq!(snapshot.indices.as_ref().map(|b| b.count), Some(9));
    assert_eq!(snapshot.meshes.as_ref().map(|b| (b.count, b.stride)), Some((2, 164)));
}

#[test]
fn should_release_everything_for_an_empty_scene() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    let id = registry.register(object(triangle()));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("first rebuild failed");

    registry.unregister(id);
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("second rebuild failed");

    let snapshot = compiler.snapshot();
    assert!(snapshot.is_released());
    assert_eq!(gpu.counters.live(), 0);
    // Atlases are still bound as blank single-layer arrays.
    assert_eq!(snapshot.atlases.len(), TextureRole::ALL.len());
    assert!(snapshot.atlases.iter().all(|a| a.layers == 1 && a.size == 1));
}

#[test]
fn should_upload_one_atlas_per_role_and_rebuild() {
    let gpu = RecordingAllocator::new();
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    registry.register(traced(
        triangle(),
        MaterialDescriptor::new([1.0; 4])
            .with_texture(TextureRole::Emission, TextureHandle::solid(32, 16, [0; 4])),
    ));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("rebuild failed");

    assert_eq!(gpu.counters.texture_arrays.get(), 5);
    let emission = compiler
        .snapshot()
        .atlas(TextureRole::Emission)
        .expect("no emission atlas");
    assert_eq!(emission.role, TextureRole::Emission);
    assert_eq!(emission.size, 32);
    assert_eq!(emission.layers, 1);
}

#[test]
fn should_reject_atlases_with_more_layers_than_the_device_allows() {
    let gpu = RecordingAllocator::with_max_layers(2);
    let mut registry = SceneRegistry::new();
    let mut compiler = compiler();
    let shared = TextureHandle::solid(4, 4, [255; 4]);
    registry.register(traced(
        triangle(),
        MaterialDescriptor::new([1.0; 4]).with_texture(TextureRole::Albedo, shared.clone()),
    ));
    registry.register(traced(
        quad(),
        MaterialDescriptor::new([1.0; 4]).with_texture(TextureRole::Albedo, shared),
    ));
    compiler
        .rebuild_if_dirty(&gpu, &mut registry)
        .expect("rebuild within the limit failed");
    assert_eq!(compiler.snapshot().generation, 1);
    let created = gpu.counters.created.get();
    let arrays = gpu.counters.texture_arrays.get();

    for _ in 0..2 {
        registry.register(traced(
            triangle(),
            MaterialDescriptor::new([1.0; 4])
                .with_texture(TextureRole::Albedo, TextureHandle::solid(4, 4, [0; 4])),
        ));
    }
    let result = compiler.rebuild_if_dirty(&gpu, &mut registry);
    assert_eq!(
        result.err(),
        Some(CompileError::AtlasOverflow {
            role: TextureRole::Albedo,
            members: 3,
            limit: 2
        })
    );

    // Nothing was uploaded and the previous scene is still published.
    assert_eq!(gpu.counters.created.get(), created);
    assert_eq!(gpu.counters.texture_arrays.get(), arrays);
    assert_eq!(compiler.snapshot().generation, 1);
    assert_eq!(compiler.snapshot().meshes.as_ref().map(|b| b.count), Some(2));
}

#[test]
fn should_offset_indices_by_the_first_vertex() {
    assert_eq!(rebase_indices(&[0, 1, 2], 7), Some(vec![7, 8, 9]));
    assert_eq!(rebase_indices(&[], u32::MAX as usize), Some(vec![]));
}

#[test]
fn should_refuse_offsets_past_32_bits() {
    assert_eq!(rebase_indices(&[0, 1], u32::MAX as usize), None);
    assert_eq!(rebase_indices(&[0], u32::MAX as usize + 1), None);
    assert_eq!(rebase_indices(&[u32::MAX - 2, u32::MAX - 1], 1), Some(vec![u32::MAX - 1, u32::MAX]));
}
