//! Material descriptors and texture handles.
//!
//! A [`MaterialDescriptor`] is filled once when a material is imported. Every
//! optional property is an `Option` that is resolved to a fixed default when
//! the descriptor is turned into a [`MaterialRecord`], so the compiler never
//! has to probe a material for properties it may or may not have.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, anyhow};
use image::{ImageFormat, RgbaImage, load_from_memory_with_format};

use crate::{config::DEFAULT_TRACER_SHADER, data_structures::records::MaterialRecord};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, stable reference to CPU-side texture data.
///
/// Cloning a handle shares the pixels and keeps the identity. Two handles are
/// equal only if one is a clone of the other, even if their pixels match.
#[derive(Clone)]
pub struct TextureHandle {
    id: u64,
    image: Arc<RgbaImage>,
}

impl TextureHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            image: Arc::new(image),
        }
    }

    /// Decode a texture from raw image file contents.
    ///
    /// * `format` is an optional file extension hint (e.g. "png"). If `None`
    ///   the format is guessed from the data.
    pub fn from_bytes(bytes: &[u8], format: Option<&str>) -> anyhow::Result<Self> {
        let img = match format {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => {
                let format = ImageFormat::from_extension(fmt)
                    .ok_or_else(|| anyhow!("Unknown image format {fmt}"))?;
                load_from_memory_with_format(bytes, format)
                    .with_context(|| format!("Failed to decode {fmt} texture"))?
            }
        };
        Ok(Self::new(img.to_rgba8()))
    }

    /// A single-colour texture, handy for tests and placeholders.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl PartialEq for TextureHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TextureHandle {}

impl Hash for TextureHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "TextureHandle({}, {w}x{h})", self.id)
    }
}

/// The five texture slots of a material. Each role gets its own atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Albedo,
    Emission,
    Metallic,
    Normal,
    Roughness,
}

impl TextureRole {
    pub const ALL: [TextureRole; 5] = [
        TextureRole::Albedo,
        TextureRole::Emission,
        TextureRole::Metallic,
        TextureRole::Normal,
        TextureRole::Roughness,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            TextureRole::Albedo => "Albedo Atlas",
            TextureRole::Emission => "Emission Atlas",
            TextureRole::Metallic => "Metallic Atlas",
            TextureRole::Normal => "Normal Atlas",
            TextureRole::Roughness => "Roughness Atlas",
        }
    }

    /// Colour data is stored as sRGB, everything else is linear data.
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureRole::Albedo | TextureRole::Emission)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    #[default]
    Opaque,
    Transparent,
}

impl RenderMode {
    pub fn as_f32(self) -> f32 {
        match self {
            RenderMode::Opaque => 0.0,
            RenderMode::Transparent => 1.0,
        }
    }
}

/// Texture references of a material, indexed by [`TextureRole::index`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialTextures([Option<TextureHandle>; 5]);

impl MaterialTextures {
    pub fn get(&self, role: TextureRole) -> Option<&TextureHandle> {
        self.0[role.index()].as_ref()
    }

    pub fn set(&mut self, role: TextureRole, texture: Option<TextureHandle>) {
        self.0[role.index()] = texture;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescriptor {
    /// Name of the shader the material was authored for. Only materials whose
    /// shader matches the configured tracer shader are compiled.
    pub shader: String,
    pub color: [f32; 4],
    /// `None` when the material has emission disabled.
    pub emission: Option<[f32; 3]>,
    pub metallic: f32,
    pub smoothness: f32,
    /// Index of refraction, `None` if the material does not define one.
    pub ior: Option<f32>,
    pub render_mode: RenderMode,
    pub textures: MaterialTextures,
}

impl MaterialDescriptor {
    /// A plain opaque tracer material with the given base colour.
    pub fn new(color: [f32; 4]) -> Self {
        Self {
            shader: DEFAULT_TRACER_SHADER.to_string(),
            color,
            emission: None,
            metallic: 0.0,
            smoothness: 0.5,
            ior: None,
            render_mode: RenderMode::Opaque,
            textures: MaterialTextures::default(),
        }
    }

    pub fn with_shader(mut self, shader: &str) -> Self {
        self.shader = shader.to_string();
        self
    }

    pub fn with_texture(mut self, role: TextureRole, texture: TextureHandle) -> Self {
        self.textures.set(role, Some(texture));
        self
    }

    pub fn is_traced_by(&self, tracer_shader: &str) -> bool {
        self.shader == tracer_shader
    }

    /// The GPU record with every optional property resolved. Texture indices
    /// are left at `-1`, they are assigned by the atlas builder.
    pub fn to_record(&self) -> MaterialRecord {
        MaterialRecord {
            color: self.color,
            emission: self.emission.unwrap_or([0.0; 3]),
            metallic: self.metallic,
            smoothness: self.smoothness,
            ior: self.ior.unwrap_or(1.0),
            render_mode: self.render_mode.as_f32(),
            ..MaterialRecord::DEFAULT
        }
    }
}
