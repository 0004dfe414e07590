//! Common types and descriptors shared by the binding layer.
//!
//! This module contains shader stage and resource enums, fixed-function
//! pipeline state, formats, usage flags, and descriptor structs.

mod buffer;
mod format;
mod resource;
mod sampler;
mod stage;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use format::{IndexFormat, TextureFormat, VertexFormat};
pub use resource::{ResourceDimension, ResourceKind, ResourceState};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use stage::{ShaderStage, ShaderStageFlags};
pub use state::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ColorWrites, CullMode,
    DepthStencilState, FillMode, FixedFunctionState, FrontFace, PrimitiveTopology,
    RasterizerState,
};
pub use texture::{TextureDescriptor, TextureUsage};
