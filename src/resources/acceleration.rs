//! Top-level acceleration structure handle.
//!
//! Building the structure is the caller's job; the binding layer only needs
//! its GPU address to bind it as a raw shader resource view.

use std::sync::Arc;

use crate::backend::{GpuAddress, GpuBuffer, OwnedBuffer};
use crate::device::GraphicsDevice;

/// Storage of a top-level acceleration structure.
pub struct AccelerationStructure {
    device: Arc<GraphicsDevice>,
    buffer: OwnedBuffer,
    label: Option<String>,
}

impl AccelerationStructure {
    pub(crate) fn new(device: Arc<GraphicsDevice>, buffer: OwnedBuffer, label: Option<String>) -> Self {
        Self {
            device,
            buffer,
            label,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn buffer(&self) -> &GpuBuffer {
        self.buffer.buffer()
    }

    /// Address bound at acceleration structure root parameters.
    pub fn address(&self) -> GpuAddress {
        self.buffer.address()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl std::fmt::Debug for AccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("address", &format_args!("{:#x}", self.buffer.address()))
            .field("size", &self.buffer.size())
            .field("label", &self.label)
            .finish()
    }
}
