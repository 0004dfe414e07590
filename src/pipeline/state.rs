//! Pipeline state keys and built states.

use crate::backend::PipelineHandle;
use crate::shader::ShaderId;
use crate::types::{
    BlendState, DepthStencilState, FixedFunctionState, PrimitiveTopology, RasterizerState,
};

/// Identity of a pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStateKey {
    Graphics {
        shader: ShaderId,
        topology: PrimitiveTopology,
        rasterizer: RasterizerState,
        blend: BlendState,
        depth_stencil: DepthStencilState,
    },
    Compute(ShaderId),
    RayTracing(ShaderId),
}

impl PipelineStateKey {
    /// Key of a graphics pipeline.
    pub fn graphics(shader: ShaderId, topology: PrimitiveTopology, state: FixedFunctionState) -> Self {
        Self::Graphics {
            shader,
            topology,
            rasterizer: state.rasterizer,
            blend: state.blend,
            depth_stencil: state.depth_stencil,
        }
    }

    /// The program the pipeline was built from.
    pub fn shader(&self) -> ShaderId {
        match *self {
            Self::Graphics { shader, .. } | Self::Compute(shader) | Self::RayTracing(shader) => shader,
        }
    }
}

/// A built pipeline state object.
#[derive(Debug)]
pub struct PipelineState {
    key: PipelineStateKey,
    handle: PipelineHandle,
    label: String,
    revision: u32,
}

impl PipelineState {
    pub(crate) fn new(key: PipelineStateKey, handle: PipelineHandle, label: String, revision: u32) -> Self {
        Self {
            key,
            handle,
            label,
            revision,
        }
    }

    pub fn key(&self) -> &PipelineStateKey {
        &self.key
    }

    /// Device handle of the pipeline.
    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Program revision the pipeline was built from.
    pub fn revision(&self) -> u32 {
        self.revision
    }
}
