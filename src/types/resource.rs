//! Resource classification shared by reflection, materials and binding.

/// What a shader binding expects to be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Read-only shader resource (sampled texture or read-only buffer).
    Texture,
    /// Read-write resource (storage texture or read-write buffer).
    Uav,
    /// Sampler state.
    Sampler,
    /// Top-level ray tracing acceleration structure.
    AccelerationStructure,
}

impl ResourceKind {
    /// The D3D-style register class letter: `t`, `u`, `s`.
    ///
    /// Acceleration structures share the `t` namespace with textures.
    pub fn register_class(self) -> char {
        match self {
            Self::Texture | Self::AccelerationStructure => 't',
            Self::Uav => 'u',
            Self::Sampler => 's',
        }
    }
}

/// Declared dimension of a texture or UAV binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    /// Samplers and acceleration structures.
    None,
    /// Structured or raw buffer view.
    Buffer,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMs,
    Texture2DMsArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
}

/// Tracked usage state of a GPU resource.
///
/// Only the explicit backend records transitions between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    /// Read by pixel shaders only.
    PixelShaderResource,
    /// Read by non-pixel shaders only.
    NonPixelShaderResource,
    /// Read by pixel and non-pixel shaders.
    AllShaderResource,
    UnorderedAccess,
    RenderTarget,
    DepthWrite,
    CopyDest,
    RaytracingAccelerationStructure,
}
