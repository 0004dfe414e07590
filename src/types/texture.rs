//! Texture types and descriptors.

use bitflags::bitflags;

use super::{ResourceDimension, TextureFormat};

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied to.
        const COPY_DST = 1 << 0;
        /// Texture can be read in a shader.
        const SHADER_RESOURCE = 1 << 1;
        /// Texture can be bound as a UAV.
        const UNORDERED_ACCESS = 1 << 2;
        /// Texture can be a color target.
        const RENDER_TARGET = 1 << 3;
        /// Texture can be a depth-stencil target.
        const DEPTH_STENCIL = 1 << 4;
    }
}

/// Descriptor for creating a texture (or a buffer resource viewed as one).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label, also reported as the last-bound path in materials.
    pub label: Option<String>,
    pub dimension: ResourceDimension,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, layer count for arrays, 6 × cubes for cube arrays.
    pub depth_or_layers: u32,
    pub mip_levels: u32,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a sampled 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            dimension: ResourceDimension::Texture2D,
            format,
            width,
            height,
            depth_or_layers: 1,
            mip_levels: 1,
            usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST,
        }
    }

    /// Create a cube texture descriptor.
    pub fn new_cube(size: u32, format: TextureFormat) -> Self {
        Self {
            dimension: ResourceDimension::TextureCube,
            depth_or_layers: 6,
            ..Self::new_2d(size, size, format)
        }
    }

    /// Create a 3D texture descriptor.
    pub fn new_3d(width: u32, height: u32, depth: u32, format: TextureFormat) -> Self {
        Self {
            dimension: ResourceDimension::Texture3D,
            depth_or_layers: depth,
            ..Self::new_2d(width, height, format)
        }
    }

    /// Create a structured buffer resource of `elements` entries.
    pub fn new_buffer(elements: u32, stride: u32) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            format: TextureFormat::R32Uint,
            width: elements,
            height: stride,
            ..Self::new_2d(1, 1, TextureFormat::R32Uint)
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the dimension.
    pub fn with_dimension(mut self, dimension: ResourceDimension) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the usage flags.
    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
}
