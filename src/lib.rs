//! # RedLilium Binding
//!
//! Reflection-driven GPU resource binding and pipeline state caching.
//!
//! ## Overview
//!
//! Shader bytecode is reflected into a [`ResourceBindingTable`]. From that
//! table the active backend synthesizes how resources reach the GPU:
//!
//! - **Explicit** - A root signature with root constant buffer views,
//!   descriptor tables and static samplers. Supports ray tracing.
//! - **Implicit** - Per-stage constant buffer, shader resource, sampler and
//!   UAV slots.
//!
//! On top of that the crate provides:
//! - [`ConstantBufferMap`] - Named constant writes into per-frame ring slots
//! - [`PipelineCache`] - Pipeline state objects built once per key
//! - [`Material`] - Name → texture/UAV bindings checked against reflection
//! - [`Renderer`] - `submit`, `dispatch_compute` and `dispatch_rays`
//!
//! The GPU itself sits behind the [`GpuDevice`] trait. [`HeadlessDevice`]
//! keeps everything in CPU memory for tests and tools.
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_binding::*;
//!
//! let (device, _) = GraphicsDevice::headless(BindingConfig::default())?;
//! let library = Arc::new(ShaderLibrary::new(device.clone()));
//! let program = library.load("forward.wgsl", descriptor)?;
//! let material = Material::create(program.clone());
//!
//! let mut renderer = Renderer::new(device.clone(), library);
//! renderer.begin_frame()?;
//! let mut map = program.map_constant_buffer(&device, None)?;
//! map.set_matrix("gWorld", &Mat4::IDENTITY);
//! map.unmap()?;
//! renderer.submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 1)?;
//! renderer.end_frame()?;
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod logging;
pub mod materials;
pub mod pipeline;
pub mod raytracing;
pub mod renderer;
pub mod resources;
pub mod shader;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    Backend, BindPoint, BindingContract, CommandList, GpuDevice, HeadlessDevice, OwnedBuffer,
    ReleaseQueue, RenderCommand, RootSignature, SlotTable,
};
pub use config::{BackendType, BindingConfig};
pub use constants::{ConstantBufferLayout, ConstantBufferMap, ConstantBufferRing, RingSlot};
pub use device::GraphicsDevice;
pub use error::{
    BindingError, CapacityError, DeviceError, GraphicsError, LoadError, MapError,
    PipelineBuildError,
};
pub use logging::{init_logging, LoggingConfig};
pub use materials::Material;
pub use pipeline::{PipelineCache, PipelineState, PipelineStateKey};
pub use raytracing::{
    GeometryInstance, HitGroupDesc, RayTracingLibraryDesc, RaytracingScene, ShaderBindingTable,
};
pub use renderer::Renderer;
pub use resources::{AccelerationStructure, Mesh, MeshDescriptor, Submesh, Texture};
pub use shader::{
    ProgramStatus, ResourceBindingTable, ShaderCode, ShaderDescriptor, ShaderId, ShaderLibrary,
    ShaderProgram, StageBytecode,
};
pub use types::{
    BlendState, DepthStencilState, FixedFunctionState, PrimitiveTopology, RasterizerState,
    ResourceDimension, ResourceKind, ShaderStage, TextureDescriptor, TextureFormat,
};

/// Binding layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
