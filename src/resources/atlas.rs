//! Texture atlases: one layered texture array per texture role.
//!
//! Materials reference textures by handle. For every role the builder keeps the
//! distinct handles in first-seen order and hands out their position as the
//! atlas layer index. Once all materials are resolved, every member is
//! resampled to a common square resolution and becomes one layer of that
//! role's array.

use std::collections::HashMap;

use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::data_structures::{
    material::{MaterialTextures, TextureHandle, TextureRole},
    records::NO_TEXTURE,
};

/// Fill colour of layers without a member texture.
pub const EMPTY_LAYER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Size ladder of the atlases.
///
/// Sizes of at least `max_size` are kept at `max_size` as long as the atlas has
/// no more than `max_full_size_members` layers and drop to `reduced_size`
/// otherwise. Sizes between `reduced_size` and `max_size` snap down to
/// `reduced_size`. Anything smaller is kept as is.
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasPolicy {
    pub max_size: u32,
    pub reduced_size: u32,
    pub max_full_size_members: usize,
}

impl AtlasPolicy {
    pub fn clamp(&self, size: u32, members: usize) -> u32 {
        if size >= self.max_size {
            if members <= self.max_full_size_members {
                self.max_size
            } else {
                self.reduced_size
            }
        } else if size >= self.reduced_size {
            self.reduced_size
        } else {
            size.max(1)
        }
    }
}

impl Default for AtlasPolicy {
    fn default() -> Self {
        Self {
            max_size: 2048,
            reduced_size: 1024,
            max_full_size_members: 16,
        }
    }
}

/// The CPU side of one atlas: square layers ready for upload.
#[derive(Clone, Debug)]
pub struct AtlasImage {
    pub role: TextureRole,
    /// Edge length of every layer. Layers are square, so non-square members
    /// are stretched to the larger of their two edges.
    pub size: u32,
    /// Never empty; an atlas without members carries one blank layer.
    pub layers: Vec<RgbaImage>,
}

impl AtlasImage {
    pub fn layer_count(&self) -> u32 {
        self.layers.len() as u32
    }
}

#[derive(Default)]
struct RoleMembers {
    members: Vec<TextureHandle>,
    lookup: HashMap<TextureHandle, i32>,
}

impl RoleMembers {
    fn resolve(&mut self, texture: Option<&TextureHandle>) -> i32 {
        let Some(texture) = texture else {
            return NO_TEXTURE;
        };
        if let Some(idx) = self.lookup.get(texture) {
            return *idx;
        }
        let idx = self.members.len() as i32;
        self.members.push(texture.clone());
        self.lookup.insert(texture.clone(), idx);
        idx
    }
}

/// Result of [`TextureAtlasBuilder::build`].
pub struct AtlasBuild {
    /// Indexed by [`TextureRole::index`].
    pub atlases: Vec<AtlasImage>,
    /// Per input material, its texture index for every role.
    pub assignment: Vec<[i32; 5]>,
}

#[derive(Default)]
pub struct TextureAtlasBuilder {
    roles: [RoleMembers; 5],
}

impl TextureAtlasBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one material's textures to atlas indices, registering textures
    /// not seen before. Missing textures resolve to `-1`.
    pub fn resolve(&mut self, textures: &MaterialTextures) -> [i32; 5] {
        TextureRole::ALL.map(|role| self.roles[role.index()].resolve(textures.get(role)))
    }

    pub fn members(&self, role: TextureRole) -> &[TextureHandle] {
        &self.roles[role.index()].members
    }

    /// Square edge length of `role`'s atlas after applying `policy`.
    pub fn atlas_size(&self, role: TextureRole, policy: &AtlasPolicy) -> u32 {
        let members = self.members(role);
        let size = members
            .iter()
            .map(|texture| {
                let (w, h) = texture.dimensions();
                w.max(h)
            })
            .max()
            .unwrap_or(1);
        policy.clamp(size, members.len())
    }

    /// Resample `role`'s members into atlas layers.
    pub fn image(&self, role: TextureRole, policy: &AtlasPolicy) -> AtlasImage {
        let size = self.atlas_size(role, policy);
        let members = self.members(role);
        let mut layers: Vec<RgbaImage> = members
            .iter()
            .map(|texture| {
                let img = texture.image();
                if img.dimensions() == (size, size) {
                    img.clone()
                } else {
                    image::imageops::resize(img, size, size, FilterType::Triangle)
                }
            })
            .collect();
        if layers.is_empty() {
            layers.push(RgbaImage::from_pixel(size, size, EMPTY_LAYER));
        }
        AtlasImage { role, size, layers }
    }

    pub fn images(&self, policy: &AtlasPolicy) -> Vec<AtlasImage> {
        TextureRole::ALL
            .iter()
            .map(|role| self.image(*role, policy))
            .collect()
    }

    /// One-shot variant: resolve all `materials` in order and build every atlas.
    pub fn build(materials: &[&MaterialTextures], policy: &AtlasPolicy) -> AtlasBuild {
        let mut builder = Self::new();
        let assignment = materials
            .iter()
            .map(|textures| builder.resolve(textures))
            .collect();
        AtlasBuild {
            atlases: builder.images(policy),
            assignment,
        }
    }
}
