//! Per-stage slot assignment for the implicit backend.
//!
//! Every resource goes to the hardware slot named by its register, once per
//! declaring stage. There are no register spaces, root parameters or
//! acceleration structures.

use std::collections::HashMap;

use crate::constants::{ConstantBufferRing, RingSlot};
use crate::error::LoadError;
use crate::resources::Texture;
use crate::shader::{ResourceBinding, ResourceBindingTable};
use crate::types::{ResourceKind, SamplerDescriptor, ShaderStage, ShaderStageFlags};

use super::samplers::resolve_sampler;
use super::{CommandList, RenderCommand};

const BACKEND: &str = "implicit";

/// Slots available per stage for each register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLimits {
    pub constant_buffers: u32,
    pub shader_resources: u32,
    pub samplers: u32,
    pub unordered_access: u32,
}

impl SlotLimits {
    pub const DEFAULT: Self = Self {
        constant_buffers: 14,
        shader_resources: 128,
        samplers: 16,
        unordered_access: 8,
    };

    fn for_kind(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Texture | ResourceKind::AccelerationStructure => self.shader_resources,
            ResourceKind::Uav => self.unordered_access,
            ResourceKind::Sampler => self.samplers,
        }
    }
}

impl Default for SlotLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A hardware slot in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageSlot {
    pub stage: ShaderStage,
    pub slot: u32,
}

/// A sampler bound by value at its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSampler {
    pub name: String,
    pub preset: &'static str,
    pub descriptor: SamplerDescriptor,
    pub slots: Vec<StageSlot>,
}

/// Slot assignment for every input of a program.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    constant_buffers: Vec<Vec<StageSlot>>,
    resources: HashMap<String, Vec<StageSlot>>,
    samplers: Vec<SlotSampler>,
}

fn stage_slots(stages: ShaderStageFlags, slot: u32) -> Vec<StageSlot> {
    stages.stages().map(|stage| StageSlot { stage, slot }).collect()
}

fn check_slot(
    name: &str,
    stages: ShaderStageFlags,
    slot: u32,
    space: u32,
    limit: u32,
) -> Result<(), LoadError> {
    if space != 0 {
        return Err(LoadError::UnsupportedSpace {
            backend: BACKEND,
            name: name.to_string(),
            space,
        });
    }
    if slot >= limit {
        return Err(LoadError::SlotLimit {
            stage: stages.stages().next().unwrap_or(ShaderStage::Vertex),
            name: name.to_string(),
            slot,
            limit,
        });
    }
    Ok(())
}

impl SlotTable {
    /// Assign slots with the default limits.
    pub fn synthesize(path: &str, table: &ResourceBindingTable) -> Result<Self, LoadError> {
        Self::with_limits(path, table, SlotLimits::DEFAULT)
    }

    pub fn with_limits(
        path: &str,
        table: &ResourceBindingTable,
        limits: SlotLimits,
    ) -> Result<Self, LoadError> {
        let mut slots = Self::default();

        for layout in table.constant_buffers() {
            check_slot(
                &layout.name,
                layout.stages,
                layout.register,
                layout.space,
                limits.constant_buffers,
            )?;
            slots
                .constant_buffers
                .push(stage_slots(layout.stages, layout.register));
        }

        for binding in table.bindings() {
            if binding.kind == ResourceKind::AccelerationStructure {
                return Err(LoadError::UnsupportedBinding {
                    backend: BACKEND,
                    name: binding.name.clone(),
                    kind: binding.kind,
                });
            }
            check_slot(
                &binding.name,
                binding.stages,
                binding.register,
                binding.space,
                limits.for_kind(binding.kind),
            )?;

            let assigned = stage_slots(binding.stages, binding.register);
            if binding.kind == ResourceKind::Sampler {
                let (preset, descriptor) = resolve_sampler(&binding.name);
                slots.samplers.push(SlotSampler {
                    name: binding.name.clone(),
                    preset,
                    descriptor,
                    slots: assigned,
                });
            } else {
                slots.resources.insert(binding.name.clone(), assigned);
            }
        }

        log::debug!(
            "{path}: {} constant buffer slots, {} resource slots, {} samplers",
            slots.constant_buffers.len(),
            slots.resources.len(),
            slots.samplers.len()
        );
        Ok(slots)
    }

    /// Slots of the constant buffer at `index` in the binding table.
    pub fn constant_buffer_slots(&self, index: usize) -> &[StageSlot] {
        self.constant_buffers.get(index).map_or(&[], Vec::as_slice)
    }

    /// Slots of a texture or UAV.
    pub fn resource_slots(&self, name: &str) -> &[StageSlot] {
        self.resources.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn samplers(&self) -> &[SlotSampler] {
        &self.samplers
    }

    pub(crate) fn bind_constant_buffer(
        &self,
        commands: &mut CommandList,
        index: usize,
        ring: &ConstantBufferRing,
        slot: RingSlot,
    ) {
        for target in self.constant_buffer_slots(index) {
            commands.push(RenderCommand::SetConstantBuffer {
                stage: target.stage,
                slot: target.slot,
                buffer: ring.buffer().id(),
                offset: slot.offset,
                size: u64::from(ring.layout_size()),
            });
        }
    }

    pub(crate) fn bind_resource(
        &self,
        commands: &mut CommandList,
        binding: &ResourceBinding,
        texture: &Texture,
    ) {
        for target in self.resource_slots(&binding.name) {
            let command = if binding.kind == ResourceKind::Uav {
                RenderCommand::SetUnorderedAccess {
                    stage: target.stage,
                    slot: target.slot,
                    texture: texture.id(),
                }
            } else {
                RenderCommand::SetShaderResource {
                    stage: target.stage,
                    slot: target.slot,
                    texture: texture.id(),
                }
            };
            commands.push(command);
        }
    }

    pub(crate) fn bind_samplers(&self, commands: &mut CommandList) {
        for sampler in &self.samplers {
            for target in &sampler.slots {
                commands.push(RenderCommand::SetSampler {
                    stage: target.stage,
                    slot: target.slot,
                    sampler: sampler.descriptor,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ConstantBufferLayout;
    use crate::shader::StageReflection;
    use crate::types::ResourceDimension;

    fn binding(name: &str, kind: ResourceKind, register: u32, space: u32) -> ResourceBinding {
        ResourceBinding {
            name: name.to_string(),
            kind,
            dimension: ResourceDimension::Texture2D,
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL,
            register,
            space,
        }
    }

    fn table(bindings: Vec<ResourceBinding>) -> ResourceBindingTable {
        ResourceBindingTable::build(
            "test",
            [StageReflection {
                constant_buffers: vec![ConstantBufferLayout {
                    name: "cbPerObject".into(),
                    size: 80,
                    variables: Vec::new(),
                    stages: ShaderStageFlags::VERTEX,
                    register: 1,
                    space: 0,
                }],
                bindings,
                ..Default::default()
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_slots_follow_registers() {
        let table = table(vec![
            binding("gAlbedo", ResourceKind::Texture, 3, 0),
            binding("gPointClamp", ResourceKind::Sampler, 2, 0),
        ]);
        let slots = SlotTable::synthesize("test", &table).unwrap();

        assert_eq!(
            slots.constant_buffer_slots(0),
            [StageSlot {
                stage: ShaderStage::Vertex,
                slot: 1
            }]
        );
        let albedo = slots.resource_slots("gAlbedo");
        assert_eq!(albedo.len(), 2);
        assert!(albedo.iter().all(|s| s.slot == 3));
        assert_eq!(slots.samplers()[0].preset, "pointclamp");
        assert!(slots.resource_slots("gMissing").is_empty());
    }

    #[test]
    fn test_rejections() {
        let err = SlotTable::synthesize("t", &table(vec![binding("gUav", ResourceKind::Uav, 8, 0)]))
            .unwrap_err();
        assert!(matches!(err, LoadError::SlotLimit { slot: 8, limit: 8, .. }));

        let err = SlotTable::synthesize("t", &table(vec![binding("gTex", ResourceKind::Texture, 0, 1)]))
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedSpace { space: 1, .. }));

        let mut scene = binding("gScene", ResourceKind::AccelerationStructure, 0, 0);
        scene.dimension = ResourceDimension::None;
        let err = SlotTable::synthesize("t", &table(vec![scene])).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedBinding { .. }));
    }
}
