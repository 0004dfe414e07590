//! Error types for the binding layer.
//!
//! Errors fall into two classes. [`BindingError`] is recovered locally: the
//! offending call is logged and ignored. Everything else is fatal and is
//! propagated to the frame loop through [`GraphicsError`].

use thiserror::Error;

use crate::types::{ResourceDimension, ResourceKind, ShaderStage};

/// Errors raised while loading a shader program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Bytecode for a stage could not be parsed.
    #[error("failed to parse {stage} bytecode of '{path}': {message}")]
    Parse {
        path: String,
        stage: ShaderStage,
        message: String,
    },

    /// Bytecode parsed but failed validation.
    #[error("{stage} bytecode of '{path}' failed validation: {message}")]
    Validation {
        path: String,
        stage: ShaderStage,
        message: String,
    },

    /// SPIR-V blob is malformed before it reaches the parser.
    #[error("invalid SPIR-V blob: {0}")]
    InvalidBytecode(String),

    /// The requested entry point is missing from the stage bytecode.
    #[error("entry point '{entry_point}' for {stage} not found in '{path}'")]
    EntryPointNotFound {
        path: String,
        stage: ShaderStage,
        entry_point: String,
    },

    /// A program was loaded without any stage.
    #[error("shader '{0}' has no stages")]
    NoStages(String),

    /// The same stage appears twice.
    #[error("shader '{path}' declares the {stage} stage more than once")]
    DuplicateStage { path: String, stage: ShaderStage },

    /// A binding resolves to different registers in different stages, or two
    /// names claim the same register.
    #[error("register conflict for '{name}': {first} vs {second}")]
    RegisterConflict {
        name: String,
        first: String,
        second: String,
    },

    /// A constant buffer is declared with different layouts in different stages.
    #[error("constant buffer '{0}' has different layouts across stages")]
    LayoutConflict(String),

    /// A constant buffer layout has overlapping or out-of-range variables.
    #[error("constant buffer '{name}' has an invalid layout: {reason}")]
    InvalidLayout { name: String, reason: String },

    /// A vertex input uses a type with no vertex format.
    #[error("vertex input '{name}' at location {location} has an unsupported type")]
    UnsupportedVertexInput { name: String, location: u32 },

    /// The backend cannot express a stage.
    #[error("the {backend} backend does not support {stage} shaders")]
    UnsupportedStage {
        backend: &'static str,
        stage: ShaderStage,
    },

    /// The backend cannot express a resource binding.
    #[error("the {backend} backend cannot bind '{name}' ({kind:?})")]
    UnsupportedBinding {
        backend: &'static str,
        name: String,
        kind: ResourceKind,
    },

    /// The backend has no register spaces.
    #[error("the {backend} backend cannot place '{name}' in register space {space}")]
    UnsupportedSpace {
        backend: &'static str,
        name: String,
        space: u32,
    },

    /// A stage uses more slots than the backend provides.
    #[error("{stage} uses slot {slot} for '{name}', limit is {limit}")]
    SlotLimit {
        stage: ShaderStage,
        name: String,
        slot: u32,
        limit: u32,
    },

    /// Root signature synthesis, serialization or validation failed.
    #[error("root signature for '{path}' is invalid: {reason}")]
    RootSignature { path: String, reason: String },

    /// The device refused to create the binding contract.
    #[error("device rejected binding contract for '{path}': {source}")]
    Device {
        path: String,
        #[source]
        source: DeviceError,
    },
}

/// Recoverable errors from named binding calls.
///
/// These are logged and turned into no-ops; callers normally never see them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("unknown shader parameter '{0}'")]
    UnknownParameter(String),

    #[error("unknown constant buffer '{0}'")]
    UnknownBuffer(String),

    #[error("'{0}' is not a declared texture")]
    UnknownTexture(String),

    #[error("'{0}' is not a declared UAV")]
    UnknownUav(String),

    #[error("'{name}' expects a {expected:?} resource, got {found:?}")]
    DimensionMismatch {
        name: String,
        expected: ResourceDimension,
        found: ResourceDimension,
    },

    #[error("'{name}' is declared as {expected}, written as {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("write of {len} bytes overruns '{name}' ({size} bytes)")]
    Overrun { name: String, size: u32, len: usize },

    #[error("constant buffer '{0}' is not mapped")]
    NotMapped(String),
}

/// A constant-buffer ring ran out of slots for the current frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("constant buffer '{buffer}' exhausted its {capacity} slots for this frame")]
pub struct CapacityError {
    pub buffer: String,
    pub capacity: u32,
}

/// Errors raised while building or binding a pipeline state object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineBuildError {
    #[error("shader '{path}' is invalid and cannot be bound: {reason}")]
    InvalidProgram { path: String, reason: String },

    #[error("shader '{path}' has no {stage} stage")]
    MissingStage { path: String, stage: ShaderStage },

    #[error("shader '{path}' does not export '{export}'")]
    MissingExport { path: String, export: String },

    #[error("pipeline kind not supported: {0}")]
    Unsupported(String),

    #[error("SPIR-V translation failed for '{path}': {message}")]
    Translation { path: String, message: String },

    #[error("device failed to build pipeline for '{path}': {source}")]
    Device {
        path: String,
        #[source]
        source: DeviceError,
    },
}

/// Errors around the exclusive constant-buffer write window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("constant buffers of '{0}' are already mapped")]
    AlreadyMapped(String),

    #[error("'{0}' cannot be bound or rebuilt while its constant buffers are mapped")]
    BoundWhileMapped(String),
}

/// Errors reported by a [`GpuDevice`](crate::backend::GpuDevice).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("out of GPU memory")]
    OutOfMemory,

    #[error("GPU device lost")]
    DeviceLost,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("creation failed: {0}")]
    CreationFailed(String),
}

/// Top-level error for the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    PipelineBuild(#[from] PipelineBuildError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl GraphicsError {
    /// Whether the error must stop the frame loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Binding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::from(DeviceError::OutOfMemory);
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::from(CapacityError {
            buffer: "cbPerObject".to_string(),
            capacity: 4,
        });
        assert_eq!(
            err.to_string(),
            "constant buffer 'cbPerObject' exhausted its 4 slots for this frame"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(!GraphicsError::from(BindingError::UnknownParameter("gFoo".into())).is_fatal());
        assert!(GraphicsError::from(MapError::AlreadyMapped("a".into())).is_fatal());
        assert!(GraphicsError::InvalidParameter("x".into()).is_fatal());
    }
}
