//! Recorded GPU commands.
//!
//! The dispatch façade records into a [`CommandList`] which the frame loop
//! hands to [`GpuDevice::execute`](super::GpuDevice::execute) at the end of the
//! frame. Commands carry plain ids and addresses so lists can be inspected.

use crate::types::{
    IndexFormat, PrimitiveTopology, ResourceState, SamplerDescriptor, ShaderStage,
};

use super::{GpuAddress, PipelineHandle, RootSignatureHandle};

/// Which root signature slot set a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    /// Compute dispatches and ray dispatches.
    Compute,
}

/// A contiguous GPU range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuRange {
    pub address: GpuAddress,
    pub size: u64,
}

/// A GPU range of fixed-stride records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuStridedRange {
    pub address: GpuAddress,
    pub size: u64,
    pub stride: u64,
}

/// Arguments of a ray dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRaysDesc {
    pub ray_generation: GpuRange,
    pub miss: GpuStridedRange,
    pub hit_groups: GpuStridedRange,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetPipelineState(PipelineHandle),
    SetRootSignature {
        bind_point: BindPoint,
        signature: RootSignatureHandle,
    },
    SetRootConstantBufferView {
        bind_point: BindPoint,
        parameter: u32,
        address: GpuAddress,
    },
    SetRootShaderResourceView {
        bind_point: BindPoint,
        parameter: u32,
        address: GpuAddress,
    },
    /// Points a descriptor table at the views of the listed textures.
    SetRootDescriptorTable {
        bind_point: BindPoint,
        parameter: u32,
        textures: Vec<u64>,
    },
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: u64,
        offset: u64,
        size: u64,
    },
    SetShaderResource {
        stage: ShaderStage,
        slot: u32,
        texture: u64,
    },
    SetUnorderedAccess {
        stage: ShaderStage,
        slot: u32,
        texture: u64,
    },
    SetSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: SamplerDescriptor,
    },
    ResourceBarrier {
        texture: u64,
        before: ResourceState,
        after: ResourceState,
    },
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexBuffer {
        buffer: u64,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: u64,
        format: IndexFormat,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchRays(DispatchRaysDesc),
}

/// An ordered list of recorded commands.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    /// Create an empty command list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command.
    pub fn push(&mut self, command: RenderCommand) {
        log::trace!("record {command:?}");
        self.commands.push(command);
    }

    /// Recorded commands in order.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop all recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Take the recorded commands, leaving the list empty.
    pub fn take(&mut self) -> CommandList {
        std::mem::take(self)
    }
}
