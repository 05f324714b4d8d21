//! The live set of traced objects.
//!
//! [`SceneRegistry`] owns no GPU resources. It only knows which objects are
//! registered, in which order they were registered, and whether anything
//! changed since the compiler last looked at it.

use std::{collections::HashMap, sync::Arc};

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::{material::MaterialDescriptor, mesh::MeshData};

/// Identity of a registered object. Ids are handed out in increasing order and
/// never reused by a registry, so they double as the registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Everything the compiler needs to know about one renderable object.
#[derive(Clone, Debug)]
pub struct TracedObject {
    pub mesh: Arc<MeshData>,
    pub transform: Matrix4<f32>,
    /// `None` for objects rendered with a non-tracer material. Their geometry
    /// is still traced but always uses the default material.
    pub material: Option<MaterialDescriptor>,
}

impl TracedObject {
    pub fn new(mesh: Arc<MeshData>) -> Self {
        Self {
            mesh,
            transform: Matrix4::identity(),
            material: None,
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: MaterialDescriptor) -> Self {
        self.material = Some(material);
        self
    }
}

#[derive(Default)]
pub struct SceneRegistry {
    entries: HashMap<ObjectId, TracedObject>,
    next_id: u64,
    dirty: bool,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object: TracedObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, object);
        self.dirty = true;
        id
    }

    /// Returns the removed object, or `None` if `id` was not registered.
    pub fn unregister(&mut self, id: ObjectId) -> Option<TracedObject> {
        self.dirty = true;
        self.entries.remove(&id)
    }

    /// Signal that a registered object's transform or material changed. The
    /// registry never polls its objects for changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called by the compiler when it starts a rebuild.
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn get(&self, id: ObjectId) -> Option<&TracedObject> {
        self.entries.get(&id)
    }

    /// Mutate a registered object and mark the registry dirty. Returns `false`
    /// if `id` is unknown.
    pub fn update(&mut self, id: ObjectId, mutation: impl FnOnce(&mut TracedObject)) -> bool {
        match self.entries.get_mut(&id) {
            Some(object) => {
                mutation(object);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn set_transform(&mut self, id: ObjectId, transform: Matrix4<f32>) -> bool {
        self.update(id, |object| object.transform = transform)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered objects in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &TracedObject)> {
        let mut ordered: Vec<_> = self.entries.iter().map(|(id, object)| (*id, object)).collect();
        ordered.sort_unstable_by_key(|(id, _)| *id);
        ordered.into_iter()
    }
}
