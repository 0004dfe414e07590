//! Headless GPU device for testing and tooling.
//!
//! This device doesn't talk to any GPU. Buffers live in host memory at
//! synthetic GPU addresses, pipelines and root signatures are counted, and
//! executed command lists are recorded so tests can inspect them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::types::{BufferDescriptor, TextureDescriptor};

use super::{
    CommandList, ComputePipelineDescriptor, GpuAddress, GpuBuffer, GpuDevice, GpuTexture,
    GraphicsPipelineDescriptor, PipelineHandle, RayTracingPipelineDescriptor, RenderCommand,
    RootSignatureHandle, ShaderIdentifier,
};

/// First synthetic GPU address handed out.
const BASE_ADDRESS: GpuAddress = 0x1_0000_0000;

/// Placement alignment of buffers in the synthetic address space.
const PLACEMENT_ALIGNMENT: u64 = 64 * 1024;

#[derive(Debug)]
struct HostBuffer {
    address: GpuAddress,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PipelineKind {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug)]
struct HostPipeline {
    kind: PipelineKind,
    exports: Vec<String>,
}

/// In-memory [`GpuDevice`].
#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    next_address: Mutex<GpuAddress>,
    buffers: Mutex<HashMap<u64, HostBuffer>>,
    textures: Mutex<HashMap<u64, TextureDescriptor>>,
    root_signatures: Mutex<HashMap<u64, Vec<u8>>>,
    pipelines: Mutex<HashMap<u64, HostPipeline>>,
    executed: Mutex<Vec<RenderCommand>>,
    submissions: AtomicU64,
    fail_pipelines: AtomicBool,
}

impl HeadlessDevice {
    /// Create a new headless device.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            next_address: Mutex::new(BASE_ADDRESS),
            buffers: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
            root_signatures: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            submissions: AtomicU64::new(0),
            fail_pipelines: AtomicBool::new(false),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Make every following pipeline creation fail (or succeed again).
    pub fn set_fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Release);
    }

    /// Read memory by GPU address, as the GPU would see it.
    pub fn read_address(&self, address: GpuAddress, size: u64) -> Option<Vec<u8>> {
        let buffers = self.buffers.lock();
        buffers.values().find_map(|buffer| {
            let end = buffer.address + buffer.data.len() as u64;
            if address >= buffer.address && address + size <= end {
                let start = (address - buffer.address) as usize;
                Some(buffer.data[start..start + size as usize].to_vec())
            } else {
                None
            }
        })
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.lock().len()
    }

    /// Number of root signatures created.
    pub fn root_signature_count(&self) -> usize {
        self.root_signatures.lock().len()
    }

    /// The serialized blob a root signature was created from.
    pub fn root_signature_blob(&self, handle: RootSignatureHandle) -> Option<Vec<u8>> {
        self.root_signatures.lock().get(&handle.0).cloned()
    }

    /// Number of pipelines created, of any kind.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Number of ray tracing pipelines created.
    pub fn raytracing_pipeline_count(&self) -> usize {
        self.pipelines
            .lock()
            .values()
            .filter(|pipeline| pipeline.kind == PipelineKind::RayTracing)
            .count()
    }

    /// Number of command lists executed.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }

    /// Every command executed so far, in order.
    pub fn executed_commands(&self) -> Vec<RenderCommand> {
        self.executed.lock().clone()
    }

    /// Drain the commands executed so far.
    pub fn take_executed(&self) -> Vec<RenderCommand> {
        std::mem::take(&mut *self.executed.lock())
    }

    fn register_pipeline(
        &self,
        label: &str,
        kind: PipelineKind,
        exports: Vec<String>,
    ) -> Result<PipelineHandle, DeviceError> {
        if self.fail_pipelines.load(Ordering::Acquire) {
            return Err(DeviceError::CreationFailed(format!(
                "pipeline '{label}' rejected by headless device"
            )));
        }
        let id = self.allocate_id();
        log::trace!("HeadlessDevice: creating {kind:?} pipeline {label} ({id})");
        self.pipelines
            .lock()
            .insert(id, HostPipeline { kind, exports });
        Ok(PipelineHandle(id))
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "Headless Device"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, DeviceError> {
        if descriptor.size == 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }
        let size = usize::try_from(descriptor.size).map_err(|_| DeviceError::OutOfMemory)?;

        let address = {
            let mut next = self.next_address.lock();
            let address = *next;
            *next = (address + descriptor.size).next_multiple_of(PLACEMENT_ALIGNMENT);
            address
        };

        let id = self.allocate_id();
        log::trace!(
            "HeadlessDevice: creating buffer {:?} (size: {}, address: {:#x})",
            descriptor.label,
            descriptor.size,
            address
        );
        self.buffers.lock().insert(
            id,
            HostBuffer {
                address,
                data: vec![0; size],
            },
        );
        Ok(GpuBuffer::new(id, descriptor.size, address))
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let mut buffers = self.buffers.lock();
        let host = buffers.get_mut(&buffer.id()).ok_or_else(|| {
            DeviceError::InvalidArgument(format!("unknown buffer {}", buffer.id()))
        })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > host.data.len() {
            return Err(DeviceError::InvalidArgument(format!(
                "write of {} bytes at {offset} overruns buffer of {} bytes",
                data.len(),
                host.data.len()
            )));
        }
        host.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Result<Vec<u8>, DeviceError> {
        let buffers = self.buffers.lock();
        let host = buffers.get(&buffer.id()).ok_or_else(|| {
            DeviceError::InvalidArgument(format!("unknown buffer {}", buffer.id()))
        })?;
        let start = offset as usize;
        let end = start + size as usize;
        host.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("read past end of buffer {}", buffer.id())))
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        if self.buffers.lock().remove(&buffer.id()).is_none() {
            log::warn!("HeadlessDevice: destroying unknown buffer {}", buffer.id());
        } else {
            log::trace!("HeadlessDevice: destroyed buffer {}", buffer.id());
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, DeviceError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "texture {:?} has zero extent",
                descriptor.label
            )));
        }
        let id = self.allocate_id();
        log::trace!(
            "HeadlessDevice: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.depth_or_layers
        );
        self.textures.lock().insert(id, descriptor.clone());
        Ok(GpuTexture::new(id))
    }

    fn destroy_texture(&self, texture: &GpuTexture) {
        if self.textures.lock().remove(&texture.id()).is_none() {
            log::warn!("HeadlessDevice: destroying unknown texture {}", texture.id());
        }
    }

    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignatureHandle, DeviceError> {
        if blob.is_empty() {
            return Err(DeviceError::InvalidArgument("empty root signature blob".into()));
        }
        let id = self.allocate_id();
        log::trace!("HeadlessDevice: creating root signature ({} bytes)", blob.len());
        self.root_signatures.lock().insert(id, blob.to_vec());
        Ok(RootSignatureHandle(id))
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.register_pipeline(&descriptor.label, PipelineKind::Graphics, Vec::new())
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.register_pipeline(&descriptor.label, PipelineKind::Compute, Vec::new())
    }

    fn create_raytracing_pipeline(
        &self,
        descriptor: &RayTracingPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        let exports = descriptor
            .exports
            .iter()
            .cloned()
            .chain(descriptor.hit_groups.iter().map(|group| group.name.clone()))
            .collect();
        self.register_pipeline(&descriptor.label, PipelineKind::RayTracing, exports)
    }

    fn shader_identifier(&self, pipeline: PipelineHandle, export: &str) -> Option<ShaderIdentifier> {
        let pipelines = self.pipelines.lock();
        let host = pipelines.get(&pipeline.0)?;
        let index = host.exports.iter().position(|name| name == export)?;

        let mut bytes = [0u8; ShaderIdentifier::SIZE];
        bytes[..8].copy_from_slice(&pipeline.0.to_le_bytes());
        bytes[8..16].copy_from_slice(&(index as u64 + 1).to_le_bytes());
        Some(ShaderIdentifier(bytes))
    }

    fn execute(&self, commands: &CommandList) -> Result<(), DeviceError> {
        log::trace!("HeadlessDevice: executing {} commands", commands.len());
        self.executed
            .lock()
            .extend(commands.commands().iter().cloned());
        self.submissions.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_buffer_write_and_address_read() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(512, BufferUsage::UPLOAD))
            .unwrap();

        device.write_buffer(&buffer, 256, &[1, 2, 3, 4]).unwrap();

        assert_eq!(device.read_buffer(&buffer, 256, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(
            device.read_address(buffer.address() + 256, 4),
            Some(vec![1, 2, 3, 4])
        );
        assert!(device.write_buffer(&buffer, 510, &[0; 4]).is_err());
    }

    #[test]
    fn test_buffers_do_not_overlap() {
        let device = HeadlessDevice::new();
        let a = device
            .create_buffer(&BufferDescriptor::new(100_000, BufferUsage::UPLOAD))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::UPLOAD))
            .unwrap();
        assert!(b.address() >= a.address() + a.size());
        assert_eq!(b.address() % PLACEMENT_ALIGNMENT, 0);
    }

    #[test]
    fn test_destroyed_buffer_is_gone() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::UPLOAD))
            .unwrap();
        assert_eq!(device.buffer_count(), 1);

        device.destroy_buffer(&buffer);
        assert_eq!(device.buffer_count(), 0);
        assert!(device.read_address(buffer.address(), 4).is_none());
        assert!(device.write_buffer(&buffer, 0, &[1]).is_err());
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let device = HeadlessDevice::new();
        assert!(device
            .create_buffer(&BufferDescriptor::new(0, BufferUsage::UPLOAD))
            .is_err());
    }
}
