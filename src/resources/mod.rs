//! GPU resources bound through materials and the renderer.
//!
//! - [`Texture`] - Textures and buffer views bound as SRVs or UAVs
//! - [`Mesh`] - Vertex and index buffers with submesh ranges
//! - [`AccelerationStructure`] - Top-level scene for ray dispatches

mod acceleration;
mod mesh;
mod texture;

pub use acceleration::AccelerationStructure;
pub use mesh::{Mesh, MeshDescriptor, Submesh};
pub use texture::Texture;
