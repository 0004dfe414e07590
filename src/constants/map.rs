//! Scoped CPU write windows over a program's constant buffers.

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3, Vec4};
use parking_lot::MutexGuard;

use crate::backend::GpuDevice;
use crate::error::{BindingError, DeviceError, GraphicsError};

use super::layout::{ParamType, ScalarType};
use super::mapper::WriteValue;
use super::ConstantBuffers;

/// An open write window over one or all constant buffers of a program.
///
/// Obtained from [`ShaderProgram::map_constant_buffer`]. Named setters
/// return how many locations they wrote; unknown names and mismatched writes
/// are logged and write nothing. Closing the window with [`unmap`] (or by
/// dropping the guard) uploads every written buffer to its current slot.
///
/// [`ShaderProgram::map_constant_buffer`]: crate::shader::ShaderProgram::map_constant_buffer
/// [`unmap`]: Self::unmap
pub struct ConstantBufferMap<'a> {
    buffers: MutexGuard<'a, ConstantBuffers>,
    gpu: &'a dyn GpuDevice,
    program: &'a str,
    mapped: Vec<bool>,
    closed: bool,
}

impl std::fmt::Debug for ConstantBufferMap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantBufferMap")
            .field("buffers", &*self.buffers)
            .field("program", &self.program)
            .field("mapped", &self.mapped)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<'a> ConstantBufferMap<'a> {
    /// Open the window, allocating a slot for every mapped buffer that has
    /// none this frame.
    pub(crate) fn open(
        mut buffers: MutexGuard<'a, ConstantBuffers>,
        gpu: &'a dyn GpuDevice,
        program: &'a str,
        buffer: Option<&str>,
    ) -> Result<Self, GraphicsError> {
        let count = buffers.layouts().len();
        let mapped = match buffer {
            None => vec![true; count],
            Some(name) => {
                let index = buffers
                    .mapper()
                    .buffer_index(name)
                    .ok_or_else(|| BindingError::UnknownBuffer(name.to_string()))?;
                (0..count).map(|i| i == index).collect()
            }
        };

        for (ring, _) in buffers
            .rings_mut()
            .iter_mut()
            .zip(&mapped)
            .filter(|(_, mapped)| **mapped)
        {
            let (slot, fresh) = ring.current_or_allocate()?;
            if fresh {
                log::trace!("{program}: mapped '{}' into new slot {}", ring.name(), slot.index);
            }
        }

        Ok(Self {
            buffers,
            gpu,
            program,
            mapped,
            closed: false,
        })
    }

    /// Write an `int`.
    pub fn set_int(&mut self, name: &str, value: i32) -> usize {
        self.write_typed(name, ParamType::Scalar(ScalarType::Int), bytemuck::bytes_of(&value))
    }

    /// Write a `uint`.
    pub fn set_uint(&mut self, name: &str, value: u32) -> usize {
        self.write_typed(name, ParamType::Scalar(ScalarType::Uint), bytemuck::bytes_of(&value))
    }

    /// Write a `float`.
    pub fn set_float(&mut self, name: &str, value: f32) -> usize {
        self.write_typed(name, ParamType::Scalar(ScalarType::Float), bytemuck::bytes_of(&value))
    }

    /// Write a `float2`.
    pub fn set_float2(&mut self, name: &str, value: Vec2) -> usize {
        self.write_typed(name, ParamType::Vector(ScalarType::Float, 2), bytemuck::bytes_of(&value))
    }

    /// Write a `float3`.
    pub fn set_float3(&mut self, name: &str, value: Vec3) -> usize {
        self.write_typed(name, ParamType::Vector(ScalarType::Float, 3), bytemuck::bytes_of(&value))
    }

    /// Write a `float4`.
    pub fn set_float4(&mut self, name: &str, value: Vec4) -> usize {
        self.write_typed(name, ParamType::Vector(ScalarType::Float, 4), bytemuck::bytes_of(&value))
    }

    /// Write a 4x4 matrix in column-major order.
    pub fn set_matrix(&mut self, name: &str, value: &Mat4) -> usize {
        self.write_typed(
            name,
            ParamType::Matrix {
                columns: 4,
                rows: 4,
            },
            bytemuck::bytes_of(value),
        )
    }

    /// Write any plain-data value, checked against the variable size only.
    pub fn set_struct<T: Pod>(&mut self, name: &str, value: &T) -> usize {
        self.write(name, WriteValue::Raw(bytemuck::bytes_of(value)))
    }

    /// Write raw bytes to a variable, or to a whole buffer from offset 0 when
    /// `name` is a constant buffer name.
    pub fn set_constant(&mut self, name: &str, bytes: &[u8]) -> usize {
        if !self.buffers.mapper().contains(name) {
            if let Some(write) = self.buffers.mapper().buffer_write(name) {
                return self.apply(name, &[write], WriteValue::Raw(bytes));
            }
        }
        self.write(name, WriteValue::Raw(bytes))
    }

    fn write_typed(&mut self, name: &str, ty: ParamType, bytes: &[u8]) -> usize {
        self.write(name, WriteValue::Typed(ty, bytes))
    }

    /// Write a value to every mapped location declaring `name`.
    pub fn write(&mut self, name: &str, value: WriteValue<'_>) -> usize {
        let writes = self.buffers.mapper().resolve(name).to_vec();
        if writes.is_empty() {
            log::warn!(
                "{}: {}",
                self.program,
                BindingError::UnknownParameter(name.to_string())
            );
            return 0;
        }
        self.apply(name, &writes, value)
    }

    fn apply(&mut self, name: &str, writes: &[super::ParamWrite], value: WriteValue<'_>) -> usize {
        let mut written = 0;
        for write in writes {
            if !self.mapped[write.buffer] {
                let buffer = self.buffers.layouts()[write.buffer].name.clone();
                log::debug!("{}: skipping '{name}', {}", self.program, BindingError::NotMapped(buffer));
                continue;
            }
            if let Err(err) = write.check(name, &value) {
                log::warn!("{}: {err}", self.program);
                continue;
            }
            let ring = &mut self.buffers.rings_mut()[write.buffer];
            match write.write(name, ring.staging_mut(), &value) {
                Ok(()) => written += 1,
                Err(err) => log::warn!("{}: {err}", self.program),
            }
        }
        written
    }

    /// CPU bytes of a mapped buffer.
    pub fn bytes(&self, buffer: &str) -> Option<&[u8]> {
        let index = self.buffers.mapper().buffer_index(buffer)?;
        self.mapped[index].then(|| self.buffers.rings()[index].staging())
    }

    /// Whether a buffer is part of this window.
    pub fn is_mapped(&self, buffer: &str) -> bool {
        self.buffers
            .mapper()
            .buffer_index(buffer)
            .is_some_and(|index| self.mapped[index])
    }

    /// Close the window and upload written buffers.
    pub fn unmap(mut self) -> Result<(), GraphicsError> {
        self.closed = true;
        self.flush().map_err(GraphicsError::from)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        let gpu = self.gpu;
        let mapped = &self.mapped;
        for (ring, _) in self
            .buffers
            .rings_mut()
            .iter_mut()
            .zip(mapped)
            .filter(|(ring, mapped)| **mapped && ring.is_dirty())
        {
            ring.upload(gpu)?;
        }
        Ok(())
    }
}

impl Drop for ConstantBufferMap<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.flush() {
            log::error!("{}: failed to upload constants on unmap: {err}", self.program);
        }
    }
}
