//! Shader programs: bytecode, reflection and the program library.
//!
//! A [`ShaderProgram`] is loaded once per source path by the
//! [`ShaderLibrary`]. Loading reflects every stage into a
//! [`ResourceBindingTable`], asks the backend for a binding contract, and
//! creates one constant-buffer ring per declared constant buffer.

mod binding_table;
mod library;
mod program;
mod reflect;
mod translate;

pub use binding_table::{ResourceBinding, ResourceBindingTable, UnknownBinding};
pub use library::{ShaderIdAllocator, ShaderLibrary};
pub use program::{CompiledProgram, ProgramStatus, ShaderProgram};
pub use reflect::{reflect_stage, InputElement, StageReflection};

pub(crate) use translate::to_spirv;

use crate::error::LoadError;
use crate::raytracing::RayTracingLibraryDesc;
use crate::types::{ShaderStage, TextureFormat};

/// Stable identity of a loaded shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u32);

impl ShaderId {
    /// Raw id value.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Compiled code for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderCode {
    /// SPIR-V words.
    SpirV(Vec<u32>),
    /// WGSL source, translated to SPIR-V where the backend needs it.
    Wgsl(String),
}

impl ShaderCode {
    /// SPIR-V magic number.
    pub const SPIRV_MAGIC: u32 = 0x0723_0203;

    /// Build SPIR-V code from a little-endian byte blob, as read from disk.
    pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() % 4 != 0 {
            return Err(LoadError::InvalidBytecode(format!(
                "length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        if words.first() != Some(&Self::SPIRV_MAGIC) {
            return Err(LoadError::InvalidBytecode("missing SPIR-V magic".to_string()));
        }
        Ok(Self::SpirV(words))
    }
}

/// Bytecode for one stage of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBytecode {
    pub stage: ShaderStage,
    pub code: ShaderCode,
    /// Entry point to reflect. `None` picks the first entry point of the stage.
    pub entry_point: Option<String>,
}

impl StageBytecode {
    /// Create stage bytecode.
    pub fn new(stage: ShaderStage, code: ShaderCode) -> Self {
        Self {
            stage,
            code,
            entry_point: None,
        }
    }

    /// Set the entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }
}

/// Everything needed to load a shader program.
#[derive(Debug, Clone, Default)]
pub struct ShaderDescriptor {
    pub stages: Vec<StageBytecode>,
    /// Render target formats for graphics pipelines.
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    /// Exports and hit groups for ray tracing libraries.
    pub raytracing: Option<RayTracingLibraryDesc>,
}

impl ShaderDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage.
    pub fn with_stage(mut self, stage: StageBytecode) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a WGSL stage with an entry point.
    pub fn with_wgsl(
        self,
        stage: ShaderStage,
        source: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        self.with_stage(
            StageBytecode::new(stage, ShaderCode::Wgsl(source.into())).with_entry_point(entry_point),
        )
    }

    /// Add a SPIR-V stage with an entry point.
    pub fn with_spirv(
        self,
        stage: ShaderStage,
        words: Vec<u32>,
        entry_point: impl Into<String>,
    ) -> Self {
        self.with_stage(StageBytecode::new(stage, ShaderCode::SpirV(words)).with_entry_point(entry_point))
    }

    /// Set the render target formats.
    pub fn with_targets(
        mut self,
        color_formats: impl Into<Vec<TextureFormat>>,
        depth_format: Option<TextureFormat>,
    ) -> Self {
        self.color_formats = color_formats.into();
        self.depth_format = depth_format;
        self
    }

    /// Attach a ray tracing library description.
    pub fn with_raytracing(mut self, library: RayTracingLibraryDesc) -> Self {
        self.raytracing = Some(library);
        self
    }

    /// Bytecode for a stage, if present.
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageBytecode> {
        self.stages.iter().find(|bytecode| bytecode.stage == stage)
    }
}
