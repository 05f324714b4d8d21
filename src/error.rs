//! Errors raised while compiling the scene.

use thiserror::Error;

use crate::data_structures::{material::TextureRole, registry::ObjectId};

/// A rebuild failure. The compiler aborts the whole pass and keeps the
/// previously published snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The object contributes no vertices, so neither its bounds nor its
    /// triangles are defined.
    #[error("Object {object:?} has an empty mesh")]
    EmptyMesh { object: ObjectId },

    #[error("Object {object:?} references vertex {index} but only has {vertex_count} vertices")]
    IndexOutOfRange {
        object: ObjectId,
        index: u32,
        vertex_count: usize,
    },

    /// More distinct textures in one role than the device allows array layers.
    #[error("{} needs {members} layers but the device allows {limit}", role.label())]
    AtlasOverflow {
        role: TextureRole,
        members: usize,
        limit: u32,
    },

    /// The combined vertex or index arrays outgrow 32-bit indexing.
    #[error("Object {object:?} does not fit into 32-bit vertex or index offsets")]
    OffsetOverflow { object: ObjectId },
}
