//! Texture, vertex and index formats.

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R16Float,
    R32Float,
    R32Uint,
    Rg16Float,
    Rg32Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    R11G11B10Float,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    /// Returns the size in bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::R11G11B10Float
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rg32Float | Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Format of one vertex input element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
}

impl VertexFormat {
    /// Size of the element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Float32 | Self::Uint32 | Self::Sint32 => 4,
            Self::Float32x2 | Self::Uint32x2 | Self::Sint32x2 => 8,
            Self::Float32x3 | Self::Uint32x3 | Self::Sint32x3 => 12,
            Self::Float32x4 | Self::Uint32x4 | Self::Sint32x4 => 16,
        }
    }

    /// Map a reflected scalar or vector type.
    pub(crate) fn from_naga(inner: &naga::TypeInner) -> Option<Self> {
        use naga::{ScalarKind, TypeInner, VectorSize};
        let (kind, width, components) = match *inner {
            TypeInner::Scalar(scalar) => (scalar.kind, scalar.width, 1),
            TypeInner::Vector { size, scalar } => (
                scalar.kind,
                scalar.width,
                match size {
                    VectorSize::Bi => 2,
                    VectorSize::Tri => 3,
                    VectorSize::Quad => 4,
                },
            ),
            _ => return None,
        };
        if width != 4 {
            return None;
        }
        Some(match (kind, components) {
            (ScalarKind::Float, 1) => Self::Float32,
            (ScalarKind::Float, 2) => Self::Float32x2,
            (ScalarKind::Float, 3) => Self::Float32x3,
            (ScalarKind::Float, 4) => Self::Float32x4,
            (ScalarKind::Uint, 1) => Self::Uint32,
            (ScalarKind::Uint, 2) => Self::Uint32x2,
            (ScalarKind::Uint, 3) => Self::Uint32x3,
            (ScalarKind::Uint, 4) => Self::Uint32x4,
            (ScalarKind::Sint, 1) => Self::Sint32,
            (ScalarKind::Sint, 2) => Self::Sint32x2,
            (ScalarKind::Sint, 3) => Self::Sint32x3,
            (ScalarKind::Sint, 4) => Self::Sint32x4,
            _ => return None,
        })
    }
}

/// Format of index buffer elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}
