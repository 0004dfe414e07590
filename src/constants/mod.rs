//! Constant buffer memory and named parameter writes.
//!
//! - [`ConstantBufferLayout`] - Reflected layout of one declared buffer
//! - [`ConstantBufferRing`] - Per-frame slot allocator backing one buffer
//! - [`ParameterMapper`] - Name to typed write descriptors
//! - [`ConstantBufferMap`] - Scoped write window returned by map

mod layout;
mod map;
mod mapper;
mod ring;

pub use layout::{ConstantBufferLayout, ConstantVariable, ParamType, ScalarType};
pub use map::ConstantBufferMap;
pub use mapper::{ParamWrite, ParameterMapper, WriteValue};
pub use ring::{ConstantBufferRing, RingSlot};

pub(crate) use layout::align_up;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// The constant buffers of one program: layouts, rings and the name mapper.
#[derive(Debug)]
pub struct ConstantBuffers {
    layouts: Vec<ConstantBufferLayout>,
    rings: Vec<ConstantBufferRing>,
    mapper: ParameterMapper,
}

impl ConstantBuffers {
    /// Create one ring per layout through the device's backend.
    pub(crate) fn new(
        device: &GraphicsDevice,
        layouts: &[ConstantBufferLayout],
        frame: Option<u64>,
    ) -> Result<Self, GraphicsError> {
        let config = device.config();
        let rings = layouts
            .iter()
            .map(|layout| {
                let mut ring = device.backend().create_constant_ring(
                    device.release_queue(),
                    layout,
                    config.ring_capacity_for(&layout.name),
                    config.frames_in_flight,
                )?;
                if let Some(frame) = frame {
                    ring.begin_frame(frame);
                }
                Ok(ring)
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;

        Ok(Self {
            layouts: layouts.to_vec(),
            rings,
            mapper: ParameterMapper::new(layouts),
        })
    }

    pub fn layouts(&self) -> &[ConstantBufferLayout] {
        &self.layouts
    }

    pub fn rings(&self) -> &[ConstantBufferRing] {
        &self.rings
    }

    pub(crate) fn rings_mut(&mut self) -> &mut [ConstantBufferRing] {
        &mut self.rings
    }

    pub fn mapper(&self) -> &ParameterMapper {
        &self.mapper
    }

    /// Ring of a buffer by name.
    pub fn ring(&self, name: &str) -> Option<&ConstantBufferRing> {
        self.mapper.buffer_index(name).map(|index| &self.rings[index])
    }

    /// Reset every ring for a new frame.
    pub fn begin_frame(&mut self, frame: u64) {
        for ring in &mut self.rings {
            ring.begin_frame(frame);
        }
    }

    /// Take a new slot in every buffer, or in the named one.
    pub fn allocate(&mut self, buffer: Option<&str>) -> Result<(), GraphicsError> {
        match buffer {
            None => {
                for ring in &mut self.rings {
                    ring.allocate()?;
                }
            }
            Some(name) => {
                let index = self
                    .mapper
                    .buffer_index(name)
                    .ok_or_else(|| crate::error::BindingError::UnknownBuffer(name.to_string()))?;
                self.rings[index].allocate()?;
            }
        }
        Ok(())
    }

    /// Make sure every buffer has an uploaded slot for the next draw.
    ///
    /// Buffers never allocated this frame get a slot holding their last
    /// written constants.
    pub(crate) fn prepare_for_draw(
        &mut self,
        device: &GraphicsDevice,
    ) -> Result<Vec<RingSlot>, GraphicsError> {
        self.rings
            .iter_mut()
            .map(|ring| {
                let (slot, _) = ring.current_or_allocate()?;
                if ring.is_dirty() {
                    ring.upload(device.gpu())?;
                }
                Ok(slot)
            })
            .collect()
    }
}
