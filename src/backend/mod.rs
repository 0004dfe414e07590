//! Backend abstraction layer.
//!
//! Two binding models are supported, picked once when the
//! [`GraphicsDevice`](crate::GraphicsDevice) is created:
//!
//! - [`Backend::Explicit`] - Root signatures with root CBVs, descriptor
//!   tables, raw SRVs and static samplers
//! - [`Backend::Implicit`] - One hardware slot per resource per stage
//!
//! Both drive the same [`GpuDevice`] and record into the same
//! [`CommandList`].

mod commands;
mod device;
pub mod explicit;
mod headless;
pub mod implicit;
mod release;
pub mod samplers;

pub use commands::{
    BindPoint, CommandList, DispatchRaysDesc, GpuRange, GpuStridedRange, RenderCommand,
};
pub use device::{
    ComputePipelineDescriptor, GpuAddress, GpuBuffer, GpuDevice, GpuTexture,
    GraphicsPipelineDescriptor, PipelineHandle, PipelineStage, RayTracingPipelineDescriptor,
    RootSignatureHandle, ShaderIdentifier,
};
pub use explicit::RootSignature;
pub use headless::HeadlessDevice;
pub use implicit::SlotTable;
pub use release::{OwnedBuffer, ReleaseQueue};

use std::sync::Arc;

use crate::config::BackendType;
use crate::constants::{ConstantBufferLayout, ConstantBufferRing, RingSlot};
use crate::error::{GraphicsError, LoadError, PipelineBuildError};
use crate::resources::Texture;
use crate::shader::{
    reflect_stage, to_spirv, ResourceBinding, ResourceBindingTable, ShaderCode, StageBytecode,
};
use crate::types::{ShaderStage, ShaderStageFlags};

/// Root-signature binding model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitBackend;

/// Per-stage slot binding model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitBackend;

/// The binding model in use.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Explicit(ExplicitBackend),
    Implicit(ImplicitBackend),
}

/// How a compiled program's inputs reach the GPU.
#[derive(Debug, Clone)]
pub enum BindingContract {
    RootSignature(RootSignature),
    Slots(SlotTable),
}

impl BindingContract {
    /// The root signature, on the explicit backend.
    pub fn root_signature(&self) -> Option<&RootSignature> {
        match self {
            Self::RootSignature(signature) => Some(signature),
            Self::Slots(_) => None,
        }
    }

    /// The slot table, on the implicit backend.
    pub fn slots(&self) -> Option<&SlotTable> {
        match self {
            Self::RootSignature(_) => None,
            Self::Slots(slots) => Some(slots),
        }
    }
}

impl Backend {
    pub fn new(kind: BackendType) -> Self {
        match kind {
            BackendType::Explicit => Self::Explicit(ExplicitBackend),
            BackendType::Implicit => Self::Implicit(ImplicitBackend),
        }
    }

    pub fn kind(&self) -> BackendType {
        match self {
            Self::Explicit(_) => BackendType::Explicit,
            Self::Implicit(_) => BackendType::Implicit,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Constant buffer layouts are rounded up to this many bytes.
    pub fn constant_buffer_alignment(&self) -> u32 {
        match self {
            Self::Explicit(_) => 256,
            Self::Implicit(_) => 16,
        }
    }

    pub fn supports_raytracing(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }

    pub fn supports_stage(&self, stage: ShaderStage) -> bool {
        stage != ShaderStage::RayTracing || self.supports_raytracing()
    }

    /// Reflect every stage and merge the results into a binding table.
    pub fn reflect(
        &self,
        path: &str,
        stages: &[StageBytecode],
    ) -> Result<ResourceBindingTable, LoadError> {
        if stages.is_empty() {
            return Err(LoadError::NoStages(path.to_string()));
        }

        let mut seen = ShaderStageFlags::empty();
        for bytecode in stages {
            if !self.supports_stage(bytecode.stage) {
                return Err(LoadError::UnsupportedStage {
                    backend: self.name(),
                    stage: bytecode.stage,
                });
            }
            if seen.contains(bytecode.stage.flag()) {
                return Err(LoadError::DuplicateStage {
                    path: path.to_string(),
                    stage: bytecode.stage,
                });
            }
            seen |= bytecode.stage.flag();
        }

        let alignment = self.constant_buffer_alignment();
        let reflections = stages
            .iter()
            .map(|bytecode| reflect_stage(path, bytecode, alignment))
            .collect::<Result<Vec<_>, _>>()?;
        ResourceBindingTable::build(path, reflections)
    }

    /// Turn a binding table into the contract the device consumes.
    pub fn synthesize_contract(
        &self,
        path: &str,
        table: &ResourceBindingTable,
        gpu: &dyn GpuDevice,
    ) -> Result<BindingContract, LoadError> {
        match self {
            Self::Explicit(_) => RootSignature::create(path, table, gpu).map(BindingContract::RootSignature),
            Self::Implicit(_) => SlotTable::synthesize(path, table).map(BindingContract::Slots),
        }
    }

    /// Create the per-frame ring backing one constant buffer.
    pub fn create_constant_ring(
        &self,
        queue: &Arc<ReleaseQueue>,
        layout: &ConstantBufferLayout,
        capacity: u32,
        frames_in_flight: u32,
    ) -> Result<ConstantBufferRing, GraphicsError> {
        ConstantBufferRing::new(queue, &layout.name, layout.size, capacity, frames_in_flight)
    }

    /// Shader code in the form this backend's pipelines take.
    ///
    /// The explicit backend consumes SPIR-V only.
    pub fn pipeline_stage(
        &self,
        path: &str,
        bytecode: &StageBytecode,
    ) -> Result<PipelineStage, PipelineBuildError> {
        let code = match self {
            Self::Explicit(_) => ShaderCode::SpirV(to_spirv(path, bytecode)?),
            Self::Implicit(_) => bytecode.code.clone(),
        };
        Ok(PipelineStage {
            stage: bytecode.stage,
            entry_point: bytecode.entry_point.clone(),
            code,
        })
    }

    pub fn bind_signature(
        &self,
        commands: &mut CommandList,
        contract: &BindingContract,
        bind_point: BindPoint,
    ) {
        if let BindingContract::RootSignature(signature) = contract {
            signature.bind(commands, bind_point);
        }
    }

    pub fn bind_constant_buffer(
        &self,
        commands: &mut CommandList,
        contract: &BindingContract,
        bind_point: BindPoint,
        index: usize,
        ring: &ConstantBufferRing,
        slot: RingSlot,
    ) {
        match contract {
            BindingContract::RootSignature(signature) => {
                signature.bind_constant_buffer(commands, bind_point, index, slot.address)
            }
            BindingContract::Slots(slots) => slots.bind_constant_buffer(commands, index, ring, slot),
        }
    }

    pub fn bind_resource(
        &self,
        commands: &mut CommandList,
        contract: &BindingContract,
        bind_point: BindPoint,
        binding: &ResourceBinding,
        texture: &Texture,
    ) {
        match contract {
            BindingContract::RootSignature(signature) => {
                signature.bind_resource(commands, bind_point, binding, texture)
            }
            BindingContract::Slots(slots) => slots.bind_resource(commands, binding, texture),
        }
    }

    pub fn bind_acceleration_structure(
        &self,
        commands: &mut CommandList,
        contract: &BindingContract,
        bind_point: BindPoint,
        name: &str,
        address: GpuAddress,
    ) {
        if let BindingContract::RootSignature(signature) = contract {
            signature.bind_acceleration_structure(commands, bind_point, name, address);
        }
    }

    /// Static samplers need no commands; slot samplers are bound per stage.
    pub fn bind_samplers(&self, commands: &mut CommandList, contract: &BindingContract) {
        if let BindingContract::Slots(slots) = contract {
            slots.bind_samplers(commands);
        }
    }
}
