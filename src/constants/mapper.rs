//! Named-parameter resolution.
//!
//! A shader parameter name resolves to one [`ParamWrite`] per constant buffer
//! that declares it. Each write descriptor checks the value's type and size
//! before any byte is copied.

use std::collections::HashMap;

use crate::error::BindingError;

use super::layout::{ConstantBufferLayout, ParamType, ScalarType};

/// A value about to be written through a [`ParamWrite`].
#[derive(Debug, Clone, Copy)]
pub enum WriteValue<'a> {
    /// Bytes of a value with a known shader type.
    Typed(ParamType, &'a [u8]),
    /// Raw bytes, only checked against the variable size.
    Raw(&'a [u8]),
}

impl<'a> WriteValue<'a> {
    fn bytes(&self) -> &'a [u8] {
        match *self {
            Self::Typed(_, bytes) | Self::Raw(bytes) => bytes,
        }
    }
}

/// Where one named parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamWrite {
    /// Constant buffer index within the program.
    pub buffer: usize,
    pub offset: u32,
    pub size: u32,
    pub ty: ParamType,
}

impl ParamWrite {
    /// Check that a value may be written here.
    pub fn check(&self, name: &str, value: &WriteValue<'_>) -> Result<(), BindingError> {
        if let WriteValue::Typed(ty, _) = value {
            if !compatible(self.ty, *ty) {
                return Err(BindingError::TypeMismatch {
                    name: name.to_string(),
                    expected: self.ty.to_string(),
                    found: ty.to_string(),
                });
            }
        }
        let len = value.bytes().len();
        if len > self.size as usize {
            return Err(BindingError::Overrun {
                name: name.to_string(),
                size: self.size,
                len,
            });
        }
        Ok(())
    }

    /// Check and copy a value into a CPU copy of the buffer.
    pub(crate) fn write(
        &self,
        name: &str,
        staging: &mut [u8],
        value: &WriteValue<'_>,
    ) -> Result<(), BindingError> {
        self.check(name, value)?;
        let bytes = value.bytes();
        let start = self.offset as usize;
        let end = start + bytes.len();
        let target = staging.get_mut(start..end).ok_or_else(|| BindingError::Overrun {
            name: name.to_string(),
            size: self.size,
            len: bytes.len(),
        })?;
        target.copy_from_slice(bytes);
        Ok(())
    }
}

/// Signed and unsigned integers share a bit pattern and are accepted for each other.
fn compatible(declared: ParamType, written: ParamType) -> bool {
    let integer = |s: ScalarType| matches!(s, ScalarType::Int | ScalarType::Uint);
    match (declared, written) {
        (ParamType::Scalar(a), ParamType::Scalar(b)) => a == b || (integer(a) && integer(b)),
        (ParamType::Vector(a, n), ParamType::Vector(b, m)) => {
            n == m && (a == b || (integer(a) && integer(b)))
        }
        (a, b) => a == b,
    }
}

/// Name → write descriptors for every constant-buffer variable of a program.
#[derive(Debug, Clone, Default)]
pub struct ParameterMapper {
    variables: HashMap<String, Vec<ParamWrite>>,
    buffers: HashMap<String, usize>,
    sizes: Vec<u32>,
}

impl ParameterMapper {
    /// Build the mapper for a program's constant buffers.
    pub fn new(layouts: &[ConstantBufferLayout]) -> Self {
        let mut mapper = Self::default();
        for (index, layout) in layouts.iter().enumerate() {
            mapper.buffers.insert(layout.name.clone(), index);
            mapper.sizes.push(layout.size);
            for variable in &layout.variables {
                mapper
                    .variables
                    .entry(variable.name.clone())
                    .or_default()
                    .push(ParamWrite {
                        buffer: index,
                        offset: variable.offset,
                        size: variable.size,
                        ty: variable.ty,
                    });
            }
        }
        mapper
    }

    /// Every location a parameter name is declared at. Empty if unknown.
    pub fn resolve(&self, name: &str) -> &[ParamWrite] {
        self.variables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the name is a declared variable.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Index of a constant buffer by name.
    pub fn buffer_index(&self, name: &str) -> Option<usize> {
        self.buffers.get(name).copied()
    }

    /// A write descriptor covering a whole buffer, for bulk writes.
    pub fn buffer_write(&self, name: &str) -> Option<ParamWrite> {
        let buffer = self.buffer_index(name)?;
        Some(ParamWrite {
            buffer,
            offset: 0,
            size: self.sizes[buffer],
            ty: ParamType::Struct,
        })
    }
}
