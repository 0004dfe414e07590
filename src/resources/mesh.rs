//! Indexed mesh resource.

use std::sync::Arc;

use bytemuck::Pod;

use crate::backend::{GpuBuffer, OwnedBuffer};
use crate::device::GraphicsDevice;
use crate::types::IndexFormat;

/// A contiguous index range drawn with one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Submesh {
    pub start_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
}

impl Submesh {
    pub fn new(start_index: u32, index_count: u32) -> Self {
        Self {
            start_index,
            index_count,
            base_vertex: 0,
        }
    }

    pub fn with_base_vertex(mut self, base_vertex: i32) -> Self {
        self.base_vertex = base_vertex;
        self
    }
}

/// Vertex and index data for [`GraphicsDevice::create_mesh`].
#[derive(Debug, Clone, Default)]
pub struct MeshDescriptor {
    pub label: Option<String>,
    pub vertices: Vec<u8>,
    pub vertex_stride: u32,
    pub indices: Vec<u32>,
    pub index_format: IndexFormat,
    /// Empty means one submesh covering every index.
    pub submeshes: Vec<Submesh>,
}

impl MeshDescriptor {
    /// Create a descriptor from raw vertex bytes.
    pub fn new(vertices: Vec<u8>, vertex_stride: u32, indices: Vec<u32>) -> Self {
        Self {
            label: None,
            vertices,
            vertex_stride,
            indices,
            index_format: IndexFormat::Uint32,
            submeshes: Vec::new(),
        }
    }

    /// Create a descriptor from typed vertices.
    pub fn from_vertices<V: Pod>(vertices: &[V], indices: Vec<u32>) -> Self {
        Self::new(
            bytemuck::cast_slice(vertices).to_vec(),
            std::mem::size_of::<V>() as u32,
            indices,
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Store indices as 16-bit. Every index must fit.
    pub fn with_index_format(mut self, format: IndexFormat) -> Self {
        self.index_format = format;
        self
    }

    pub fn with_submesh(mut self, submesh: Submesh) -> Self {
        self.submeshes.push(submesh);
        self
    }

    /// Index buffer bytes in the chosen format.
    pub(crate) fn index_bytes(&self) -> Option<Vec<u8>> {
        match self.index_format {
            IndexFormat::Uint32 => Some(bytemuck::cast_slice(&self.indices).to_vec()),
            IndexFormat::Uint16 => {
                let narrowed = self
                    .indices
                    .iter()
                    .map(|&index| u16::try_from(index).ok())
                    .collect::<Option<Vec<u16>>>()?;
                Some(bytemuck::cast_slice(&narrowed).to_vec())
            }
        }
    }
}

/// A mesh with GPU vertex and index buffers, retired to the device's
/// [`ReleaseQueue`](crate::backend::ReleaseQueue) when dropped.
pub struct Mesh {
    device: Arc<GraphicsDevice>,
    label: Option<String>,
    vertex_buffer: OwnedBuffer,
    index_buffer: OwnedBuffer,
    vertex_stride: u32,
    index_format: IndexFormat,
    index_count: u32,
    submeshes: Vec<Submesh>,
}

impl Mesh {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: &MeshDescriptor,
        vertex_buffer: OwnedBuffer,
        index_buffer: OwnedBuffer,
    ) -> Self {
        let index_count = descriptor.indices.len() as u32;
        let submeshes = if descriptor.submeshes.is_empty() {
            vec![Submesh::new(0, index_count)]
        } else {
            descriptor.submeshes.clone()
        };
        Self {
            device,
            label: descriptor.label.clone(),
            vertex_buffer,
            index_buffer,
            vertex_stride: descriptor.vertex_stride,
            index_format: descriptor.index_format,
            index_count,
            submeshes,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn vertex_buffer(&self) -> &GpuBuffer {
        self.vertex_buffer.buffer()
    }

    pub fn index_buffer(&self) -> &GpuBuffer {
        self.index_buffer.buffer()
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn submesh(&self, index: usize) -> Option<&Submesh> {
        self.submeshes.get(index)
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("label", &self.label)
            .field("vertex_stride", &self.vertex_stride)
            .field("index_count", &self.index_count)
            .field("submeshes", &self.submeshes.len())
            .finish()
    }
}

// Ensure Mesh is Send + Sync
static_assertions::assert_impl_all!(Mesh: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_narrowing() {
        let descriptor = MeshDescriptor::new(vec![0; 12], 12, vec![0, 1, 2])
            .with_index_format(IndexFormat::Uint16);
        assert_eq!(descriptor.index_bytes().unwrap(), [0, 0, 1, 0, 2, 0]);

        let descriptor = MeshDescriptor::new(vec![0; 12], 12, vec![0, 70_000, 2])
            .with_index_format(IndexFormat::Uint16);
        assert!(descriptor.index_bytes().is_none());
    }

    #[test]
    fn test_from_vertices() {
        let vertices = [[0.0f32; 3], [1.0; 3], [2.0; 3]];
        let descriptor = MeshDescriptor::from_vertices(&vertices, vec![0, 1, 2]);
        assert_eq!(descriptor.vertex_stride, 12);
        assert_eq!(descriptor.vertices.len(), 36);
    }
}
