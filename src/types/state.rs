//! Fixed-function pipeline state.
//!
//! Every type here is part of a graphics [`PipelineStateKey`], so all of them
//! are `Copy + Eq + Hash`.
//!
//! [`PipelineStateKey`]: crate::pipeline::PipelineStateKey

use std::hash::{Hash, Hasher};

use bitflags::bitflags;

use super::CompareFunction;

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Constant depth bias added to each fragment.
    pub depth_bias: i32,
    /// Depth bias scaled by the fragment's slope.
    pub slope_scaled_depth_bias: f32,
    pub depth_clip: bool,
}

impl RasterizerState {
    /// Solid fill, back faces culled.
    pub const CULL_BACK: Self = Self {
        fill_mode: FillMode::Solid,
        cull_mode: CullMode::Back,
        front_face: FrontFace::Ccw,
        depth_bias: 0,
        slope_scaled_depth_bias: 0.0,
        depth_clip: true,
    };

    /// Solid fill, front faces culled.
    pub const CULL_FRONT: Self = Self {
        cull_mode: CullMode::Front,
        ..Self::CULL_BACK
    };

    /// Solid fill, no culling.
    pub const CULL_NONE: Self = Self {
        cull_mode: CullMode::None,
        ..Self::CULL_BACK
    };

    /// Wireframe fill, no culling.
    pub const WIREFRAME: Self = Self {
        fill_mode: FillMode::Wireframe,
        cull_mode: CullMode::None,
        ..Self::CULL_BACK
    };

    /// Set a depth bias, as used by shadow map passes.
    pub fn with_depth_bias(mut self, constant: i32, slope_scaled: f32) -> Self {
        self.depth_bias = constant;
        self.slope_scaled_depth_bias = slope_scaled;
        self
    }
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self::CULL_BACK
    }
}

// The slope bias is compared bitwise so the state can key a hash map.
impl PartialEq for RasterizerState {
    fn eq(&self, other: &Self) -> bool {
        self.fill_mode == other.fill_mode
            && self.cull_mode == other.cull_mode
            && self.front_face == other.front_face
            && self.depth_bias == other.depth_bias
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.depth_clip == other.depth_clip
    }
}

impl Eq for RasterizerState {}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_face.hash(state);
        self.depth_bias.hash(state);
        self.slope_scaled_depth_bias.to_bits().hash(state);
        self.depth_clip.hash(state);
    }
}

/// Blend factor for blending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.0
    #[default]
    Zero,
    /// 1.0
    One,
    /// Source color
    Src,
    /// 1 - source color
    OneMinusSrc,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination color
    Dst,
    /// 1 - destination color
    OneMinusDst,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
}

/// Blend operation for combining colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend component configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    /// Source replaces destination.
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };

    /// Standard "over" alpha blending.
    pub const OVER: Self = Self {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };

    /// Premultiplied alpha blending.
    pub const PREMULTIPLIED: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };

    /// Source added to destination.
    pub const ADDITIVE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    };
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self::REPLACE
    }
}

bitflags! {
    /// Color channels written by the output merger.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Blend state for the color targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
    pub write_mask: ColorWrites,
}

impl BlendState {
    /// Blending disabled, all channels written.
    pub const NO_BLEND: Self = Self {
        enabled: false,
        color: BlendComponent::REPLACE,
        alpha: BlendComponent::REPLACE,
        write_mask: ColorWrites::ALL,
    };

    /// Standard alpha blending (src over dst).
    pub const ALPHA_BLENDING: Self = Self {
        enabled: true,
        color: BlendComponent::OVER,
        alpha: BlendComponent::OVER,
        write_mask: ColorWrites::ALL,
    };

    /// Premultiplied alpha blending.
    pub const PREMULTIPLIED_ALPHA: Self = Self {
        enabled: true,
        color: BlendComponent::PREMULTIPLIED,
        alpha: BlendComponent::PREMULTIPLIED,
        write_mask: ColorWrites::ALL,
    };

    /// Additive blending, used for light accumulation.
    pub const ADDITIVE: Self = Self {
        enabled: true,
        color: BlendComponent::ADDITIVE,
        alpha: BlendComponent::ADDITIVE,
        write_mask: ColorWrites::ALL,
    };

    /// Restrict the channels written.
    pub fn with_write_mask(mut self, mask: ColorWrites) -> Self {
        self.write_mask = mask;
        self
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::NO_BLEND
    }
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
}

impl DepthStencilState {
    /// Depth test and write with `Less`.
    pub const DEPTH_ENABLED: Self = Self {
        depth_test: true,
        depth_write: true,
        depth_compare: CompareFunction::Less,
        stencil_enable: false,
        stencil_read_mask: 0xff,
        stencil_write_mask: 0xff,
    };

    /// Depth test with `LessEqual`, no writes. Used after a depth prepass.
    pub const DEPTH_READ_ONLY: Self = Self {
        depth_write: false,
        depth_compare: CompareFunction::LessEqual,
        ..Self::DEPTH_ENABLED
    };

    /// No depth test.
    pub const DISABLED: Self = Self {
        depth_test: false,
        depth_write: false,
        depth_compare: CompareFunction::Always,
        ..Self::DEPTH_ENABLED
    };
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::DEPTH_ENABLED
    }
}

/// The fixed-function state the renderer holds between draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FixedFunctionState {
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_rasterizer_hash_by_bits() {
        let a = RasterizerState::CULL_BACK.with_depth_bias(2, 1.5);
        let b = RasterizerState::CULL_BACK.with_depth_bias(2, 1.5);
        let c = RasterizerState::CULL_BACK.with_depth_bias(2, 1.25);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_defaults() {
        let state = FixedFunctionState::default();
        assert_eq!(state.rasterizer, RasterizerState::CULL_BACK);
        assert_eq!(state.blend, BlendState::NO_BLEND);
        assert_eq!(state.depth_stencil, DepthStencilState::DEPTH_ENABLED);
    }
}
