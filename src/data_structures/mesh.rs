//! Triangle meshes as registered by the host application.

use std::sync::Arc;

use crate::data_structures::records::Vertex;

/// Axis-aligned bounding box in an object's local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// Box around a single point.
    pub fn point(p: [f32; 3]) -> Self {
        Self { min: p, max: p }
    }

    pub fn grow(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// Fold the bounds of all `points`. `None` for an empty iterator since an
    /// empty box has no meaningful corners.
    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Option<Self> {
        let mut points = points.into_iter();
        let mut aabb = Aabb::point(points.next()?);
        points.for_each(|p| aabb.grow(p));
        Some(aabb)
    }
}

/**
 * Geometry of one renderable object: a single indexed triangle list.
 *
 * Normals and texture coordinates are optional on import; missing entries
 * fall back to zero.
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            indices,
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.positions.iter().enumerate().map(|(i, position)| Vertex {
            position: *position,
            normal: self.normals.get(i).copied().unwrap_or_default(),
            uv: self.uvs.get(i).copied().unwrap_or_default(),
        })
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }

    pub fn into_shared(self) -> Arc<MeshData> {
        Arc::new(self)
    }
}
