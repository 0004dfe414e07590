//! The normalized resource binding table of a program.
//!
//! Per-stage reflections are merged into one record per name. A name seen in
//! several stages must agree on its register; the stage sets are unioned.

use crate::constants::ConstantBufferLayout;
use crate::error::LoadError;
use crate::types::{ResourceDimension, ResourceKind, ShaderStage, ShaderStageFlags};

use super::reflect::{InputElement, StageReflection};

/// A texture, UAV, sampler or acceleration structure binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub name: String,
    pub kind: ResourceKind,
    pub dimension: ResourceDimension,
    /// Every stage that declares the binding.
    pub stages: ShaderStageFlags,
    pub register: u32,
    pub space: u32,
}

impl ResourceBinding {
    /// Register in `t3 space0` notation.
    pub fn register_name(&self) -> String {
        format!(
            "{}{} space{}",
            self.kind.register_class(),
            self.register,
            self.space
        )
    }
}

/// A bound global whose type reflection does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownBinding {
    pub name: String,
    pub stage: ShaderStage,
    pub register: u32,
    pub space: u32,
    pub description: String,
}

/// Stable name → register records for every input of a program.
#[derive(Debug, Clone, Default)]
pub struct ResourceBindingTable {
    input_layout: Vec<InputElement>,
    constant_buffers: Vec<ConstantBufferLayout>,
    bindings: Vec<ResourceBinding>,
    unknown: Vec<UnknownBinding>,
}

impl ResourceBindingTable {
    /// Merge per-stage reflections.
    pub fn build(
        path: &str,
        stages: impl IntoIterator<Item = StageReflection>,
    ) -> Result<Self, LoadError> {
        let mut table = Self::default();

        for stage in stages {
            if !stage.input_layout.is_empty() {
                table.input_layout = stage.input_layout;
            }
            for layout in stage.constant_buffers {
                table.merge_constant_buffer(layout)?;
            }
            for binding in stage.bindings {
                table.merge_binding(binding)?;
            }
            table.unknown.extend(stage.unknown);
        }

        table
            .constant_buffers
            .sort_by(|a, b| (a.space, a.register).cmp(&(b.space, b.register)));
        table
            .bindings
            .sort_by(|a, b| (a.kind, a.space, a.register).cmp(&(b.kind, b.space, b.register)));

        log::debug!(
            "{path}: {} constant buffers, {} resource bindings, {} unknown",
            table.constant_buffers.len(),
            table.bindings.len(),
            table.unknown.len()
        );
        Ok(table)
    }

    fn merge_constant_buffer(&mut self, layout: ConstantBufferLayout) -> Result<(), LoadError> {
        let register = |cb: &ConstantBufferLayout| format!("b{} space{}", cb.register, cb.space);

        if let Some(existing) = self.constant_buffers.iter_mut().find(|cb| cb.name == layout.name) {
            if (existing.register, existing.space) != (layout.register, layout.space) {
                return Err(LoadError::RegisterConflict {
                    name: layout.name.clone(),
                    first: register(&*existing),
                    second: register(&layout),
                });
            }
            if !existing.same_layout(&layout) {
                return Err(LoadError::LayoutConflict(layout.name));
            }
            existing.stages |= layout.stages;
            return Ok(());
        }

        if let Some(other) = self
            .constant_buffers
            .iter()
            .find(|cb| (cb.register, cb.space) == (layout.register, layout.space))
        {
            return Err(LoadError::RegisterConflict {
                name: layout.name.clone(),
                first: format!("{} at {}", other.name, register(other)),
                second: format!("{} at {}", layout.name, register(&layout)),
            });
        }

        self.constant_buffers.push(layout);
        Ok(())
    }

    fn merge_binding(&mut self, binding: ResourceBinding) -> Result<(), LoadError> {
        if let Some(existing) = self.bindings.iter_mut().find(|b| b.name == binding.name) {
            let same = (existing.kind, existing.register, existing.space, existing.dimension)
                == (binding.kind, binding.register, binding.space, binding.dimension);
            if !same {
                return Err(LoadError::RegisterConflict {
                    name: binding.name.clone(),
                    first: format!("{} ({:?})", existing.register_name(), existing.dimension),
                    second: format!("{} ({:?})", binding.register_name(), binding.dimension),
                });
            }
            existing.stages |= binding.stages;
            return Ok(());
        }

        let class = binding.kind.register_class();
        if let Some(other) = self.bindings.iter().find(|b| {
            b.kind.register_class() == class && (b.register, b.space) == (binding.register, binding.space)
        }) {
            return Err(LoadError::RegisterConflict {
                name: binding.name.clone(),
                first: format!("{} at {}", other.name, other.register_name()),
                second: format!("{} at {}", binding.name, binding.register_name()),
            });
        }

        self.bindings.push(binding);
        Ok(())
    }

    /// Vertex input layout of the vertex stage.
    pub fn input_layout(&self) -> &[InputElement] {
        &self.input_layout
    }

    /// Tightly packed vertex stride.
    pub fn vertex_stride(&self) -> u32 {
        self.input_layout
            .iter()
            .map(|element| element.offset + element.format.size())
            .max()
            .unwrap_or(0)
    }

    /// Constant buffers ordered by (space, register).
    pub fn constant_buffers(&self) -> &[ConstantBufferLayout] {
        &self.constant_buffers
    }

    /// Index of a constant buffer by name.
    pub fn constant_buffer_index(&self, name: &str) -> Option<usize> {
        self.constant_buffers.iter().position(|cb| cb.name == name)
    }

    /// All resource bindings, ordered by (kind, space, register).
    pub fn bindings(&self) -> &[ResourceBinding] {
        &self.bindings
    }

    /// Resource bindings of one kind.
    pub fn bindings_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceBinding> {
        self.bindings.iter().filter(move |b| b.kind == kind)
    }

    /// Look up a resource binding by name.
    pub fn binding(&self, name: &str) -> Option<&ResourceBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Bindings reflection could not classify.
    pub fn unknown(&self) -> &[UnknownBinding] {
        &self.unknown
    }

    /// Union of every stage that declares anything.
    pub fn stages(&self) -> ShaderStageFlags {
        self.constant_buffers
            .iter()
            .map(|cb| cb.stages)
            .chain(self.bindings.iter().map(|b| b.stages))
            .fold(ShaderStageFlags::empty(), |acc, stages| acc | stages)
    }
}
