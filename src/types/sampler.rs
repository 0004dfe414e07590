//! Sampler types and descriptors.

/// Texture coordinate addressing outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Clamp,
    Mirror,
    Border,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Point,
    Linear,
    Anisotropic,
}

/// Comparison function for depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Full description of a sampler.
///
/// Samplers are never created individually: the explicit backend bakes them
/// into the root signature, the slot backend binds them by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub filter: FilterMode,
    pub address_mode: AddressMode,
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u8,
}

impl SamplerDescriptor {
    /// Create a sampler with the given filter and addressing.
    pub const fn new(filter: FilterMode, address_mode: AddressMode) -> Self {
        Self {
            filter,
            address_mode,
            compare: None,
            max_anisotropy: 1,
        }
    }

    /// Set the comparison function (shadow sampling).
    pub const fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Set the anisotropy level.
    pub const fn with_anisotropy(mut self, level: u8) -> Self {
        self.max_anisotropy = level;
        self
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::new(FilterMode::Linear, AddressMode::Wrap)
    }
}
