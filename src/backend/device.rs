//! The GPU device collaborator.
//!
//! The binding layer never talks to a graphics API directly. Everything that
//! touches the GPU goes through [`GpuDevice`]: buffer and texture creation,
//! their release, CPU writes into upload memory, root signature and pipeline creation,
//! shader identifier queries for shader tables, and command list execution.

use crate::error::DeviceError;
use crate::raytracing::HitGroupDesc;
use crate::shader::{InputElement, ShaderCode};
use crate::types::{
    BufferDescriptor, FixedFunctionState, PrimitiveTopology, ShaderStage, TextureDescriptor,
    TextureFormat,
};

use super::CommandList;

/// A GPU virtual address.
pub type GpuAddress = u64;

/// A buffer created by a [`GpuDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBuffer {
    id: u64,
    size: u64,
    address: GpuAddress,
}

impl GpuBuffer {
    /// Wrap a device buffer. Only device implementations create these.
    pub fn new(id: u64, size: u64, address: GpuAddress) -> Self {
        Self { id, size, address }
    }

    /// Device-unique buffer id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU virtual address of the first byte.
    pub fn address(&self) -> GpuAddress {
        self.address
    }
}

/// A texture created by a [`GpuDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTexture {
    id: u64,
}

impl GpuTexture {
    /// Wrap a device texture. Only device implementations create these.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Device-unique texture id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Handle to a root signature object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootSignatureHandle(pub u64);

/// Handle to a pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);

/// Opaque identifier of a ray tracing export, written into shader records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderIdentifier(pub [u8; ShaderIdentifier::SIZE]);

impl ShaderIdentifier {
    /// Size of an identifier in bytes.
    pub const SIZE: usize = 32;
}

/// Shader code for one pipeline stage, in the form the backend consumes.
#[derive(Debug, Clone)]
pub struct PipelineStage {
    pub stage: ShaderStage,
    pub entry_point: Option<String>,
    pub code: ShaderCode,
}

/// Everything a device needs to build a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: String,
    pub stages: Vec<PipelineStage>,
    pub input_layout: Vec<InputElement>,
    pub vertex_stride: u32,
    pub topology: PrimitiveTopology,
    pub state: FixedFunctionState,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    /// Set on the explicit backend only.
    pub root_signature: Option<RootSignatureHandle>,
}

/// Everything a device needs to build a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub stage: PipelineStage,
    pub root_signature: Option<RootSignatureHandle>,
}

/// Everything a device needs to build a ray tracing pipeline.
#[derive(Debug, Clone)]
pub struct RayTracingPipelineDescriptor {
    pub label: String,
    pub library: PipelineStage,
    /// Ray generation and miss exports.
    pub exports: Vec<String>,
    pub hit_groups: Vec<HitGroupDesc>,
    pub max_payload_size: u32,
    pub max_attribute_size: u32,
    pub max_recursion_depth: u32,
    pub root_signature: RootSignatureHandle,
}

/// The graphics device the binding layer drives.
pub trait GpuDevice: Send + Sync + 'static {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Create a buffer. Constant-buffer rings and shader tables use CPU-writable memory.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, DeviceError>;

    /// Copy bytes into a CPU-writable buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
        -> Result<(), DeviceError>;

    /// Read bytes back from a buffer.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64)
        -> Result<Vec<u8>, DeviceError>;

    /// Release a buffer. The caller guarantees no pending GPU work reads it.
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Create a texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, DeviceError>;

    /// Release a texture. The caller guarantees no pending GPU work reads it.
    fn destroy_texture(&self, texture: &GpuTexture);

    /// Create a root signature from a serialized blob.
    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignatureHandle, DeviceError>;

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError>;

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError>;

    fn create_raytracing_pipeline(
        &self,
        descriptor: &RayTracingPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError>;

    /// Identifier of an export (or hit group) of a ray tracing pipeline.
    fn shader_identifier(&self, pipeline: PipelineHandle, export: &str)
        -> Option<ShaderIdentifier>;

    /// Submit a recorded command list.
    fn execute(&self, commands: &CommandList) -> Result<(), DeviceError>;
}
