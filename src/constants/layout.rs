//! Constant buffer layouts as reflected from shader bytecode.

use std::fmt;

use crate::error::LoadError;
use crate::types::ShaderStageFlags;

/// Scalar component type of a shader parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float,
    Int,
    Uint,
    Bool,
}

/// Declared type of a constant-buffer variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Scalar(ScalarType),
    Vector(ScalarType, u8),
    Matrix { columns: u8, rows: u8 },
    Array { count: u32, stride: u32 },
    Struct,
    /// Anything reflection could not classify. Only raw writes are accepted.
    Other,
}

impl ParamType {
    /// Classify a naga type.
    pub(crate) fn from_naga(inner: &naga::TypeInner) -> Self {
        use naga::TypeInner;
        match *inner {
            TypeInner::Scalar(scalar) => match ScalarType::from_naga(scalar) {
                Some(scalar) => Self::Scalar(scalar),
                None => Self::Other,
            },
            TypeInner::Vector { size, scalar } => match ScalarType::from_naga(scalar) {
                Some(scalar) => Self::Vector(scalar, size as u8),
                None => Self::Other,
            },
            TypeInner::Matrix { columns, rows, .. } => Self::Matrix {
                columns: columns as u8,
                rows: rows as u8,
            },
            TypeInner::Array { size, stride, .. } => Self::Array {
                count: match size {
                    naga::ArraySize::Constant(count) => count.get(),
                    _ => 0,
                },
                stride,
            },
            TypeInner::Struct { .. } => Self::Struct,
            _ => Self::Other,
        }
    }
}

impl ScalarType {
    fn from_naga(scalar: naga::Scalar) -> Option<Self> {
        if scalar.width != 4 && scalar.kind != naga::ScalarKind::Bool {
            return None;
        }
        match scalar.kind {
            naga::ScalarKind::Float => Some(Self::Float),
            naga::ScalarKind::Sint => Some(Self::Int),
            naga::ScalarKind::Uint => Some(Self::Uint),
            naga::ScalarKind::Bool => Some(Self::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scalar = |scalar: &ScalarType| match scalar {
            ScalarType::Float => "float",
            ScalarType::Int => "int",
            ScalarType::Uint => "uint",
            ScalarType::Bool => "bool",
        };
        match self {
            Self::Scalar(s) => f.write_str(scalar(s)),
            Self::Vector(s, n) => write!(f, "{}{n}", scalar(s)),
            Self::Matrix { columns, rows } => write!(f, "float{rows}x{columns}"),
            Self::Array { count, stride } => write!(f, "array[{count}] (stride {stride})"),
            Self::Struct => f.write_str("struct"),
            Self::Other => f.write_str("unknown"),
        }
    }
}

/// One variable inside a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantVariable {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub ty: ParamType,
}

impl ConstantVariable {
    /// First byte past the variable.
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Layout of one declared constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferLayout {
    pub name: String,
    /// Byte size rounded up to the backend's constant-buffer alignment.
    pub size: u32,
    /// Variables in offset order.
    pub variables: Vec<ConstantVariable>,
    pub stages: ShaderStageFlags,
    pub register: u32,
    pub space: u32,
}

impl ConstantBufferLayout {
    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&ConstantVariable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Byte size before alignment: the end of the last variable.
    pub fn used_size(&self) -> u32 {
        self.variables.iter().map(ConstantVariable::end).max().unwrap_or(0)
    }

    /// Check that offsets are monotonic, non-overlapping and inside the buffer.
    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |reason: String| LoadError::InvalidLayout {
            name: self.name.clone(),
            reason,
        };

        for pair in self.variables.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.offset < prev.end() {
                return Err(invalid(format!(
                    "'{}' at {} overlaps '{}' ending at {}",
                    next.name,
                    next.offset,
                    prev.name,
                    prev.end()
                )));
            }
        }
        if self.used_size() > self.size {
            return Err(invalid(format!(
                "variables end at {} but the buffer holds {} bytes",
                self.used_size(),
                self.size
            )));
        }
        Ok(())
    }

    /// Whether two declarations describe the same memory layout.
    pub(crate) fn same_layout(&self, other: &Self) -> bool {
        self.size == other.size && self.variables == other.variables
    }
}

/// Align a value up to the given power-of-two alignment.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
