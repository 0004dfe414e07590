//! The graphics device: backend, GPU device and configuration.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{Backend, GpuDevice, HeadlessDevice, ReleaseQueue};
use crate::config::BindingConfig;
use crate::error::GraphicsError;
use crate::resources::{AccelerationStructure, Mesh, MeshDescriptor, Texture};
use crate::types::{BufferDescriptor, BufferUsage, ResourceDimension, TextureDescriptor};

/// Largest texture extent accepted.
const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Entry point of the binding layer.
///
/// A device pairs the [`Backend`] binding model chosen at creation with the
/// [`GpuDevice`] that executes commands. Shader libraries, renderers and
/// resources all hold an `Arc` to it.
///
/// # Example
///
/// ```ignore
/// let config = BindingConfig::new(BackendType::Explicit).with_ring_capacity(256);
/// let device = GraphicsDevice::new(config, Arc::new(my_gpu))?;
///
/// let library = ShaderLibrary::new(device.clone());
/// let albedo = device.create_texture(&TextureDescriptor::new_2d(
///     1024, 1024,
///     TextureFormat::Rgba8UnormSrgb,
/// ))?;
/// ```
pub struct GraphicsDevice {
    config: BindingConfig,
    backend: Backend,
    gpu: Arc<dyn GpuDevice>,
    release: Arc<ReleaseQueue>,
    // Weak tracking for debugging and leak checks
    textures: RwLock<Vec<Weak<Texture>>>,
    meshes: RwLock<Vec<Weak<Mesh>>>,
}

impl GraphicsDevice {
    /// Create a device over a GPU device.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: BindingConfig, gpu: Arc<dyn GpuDevice>) -> Result<Arc<Self>, GraphicsError> {
        config.validate()?;
        let backend = Backend::new(config.backend);

        log::info!(
            "GraphicsDevice: {} backend on '{}' ({} frames in flight, {} ring slots)",
            backend.name(),
            gpu.name(),
            config.frames_in_flight,
            config.ring_capacity
        );

        let release = Arc::new(ReleaseQueue::new(Arc::clone(&gpu), config.frames_in_flight));

        Ok(Arc::new(Self {
            config,
            backend,
            gpu,
            release,
            textures: RwLock::new(Vec::new()),
            meshes: RwLock::new(Vec::new()),
        }))
    }

    /// Create a device over a fresh [`HeadlessDevice`], returned for inspection.
    pub fn headless(
        config: BindingConfig,
    ) -> Result<(Arc<Self>, Arc<HeadlessDevice>), GraphicsError> {
        let gpu = Arc::new(HeadlessDevice::new());
        let device = Self::new(config, gpu.clone())?;
        Ok((device, gpu))
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The device commands execute on.
    pub fn gpu(&self) -> &dyn GpuDevice {
        self.gpu.as_ref()
    }

    /// Queue that GPU memory dropped by the binding layer is retired into.
    pub fn release_queue(&self) -> &Arc<ReleaseQueue> {
        &self.release
    }

    /// Start a frame: destroy memory retired `frames_in_flight` frames ago.
    ///
    /// Called by the frame loop after the frame's fence wait.
    pub fn begin_frame(&self, frame: u64) -> usize {
        self.release.begin_frame(frame)
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        self.gpu.name()
    }

    /// Create a texture or buffer view.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero or too large, or the GPU device fails.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.depth_or_layers == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        let textured = descriptor.dimension != ResourceDimension::Buffer;
        if textured
            && (descriptor.width > MAX_TEXTURE_DIMENSION || descriptor.height > MAX_TEXTURE_DIMENSION)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {MAX_TEXTURE_DIMENSION}"
            )));
        }

        let gpu = self.gpu.create_texture(descriptor)?;
        let texture = Arc::new(Texture::new(Arc::clone(self), gpu, descriptor.clone()));
        self.textures.write().push(Arc::downgrade(&texture));

        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );

        Ok(texture)
    }

    /// Create a mesh and upload its vertex and index data.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is empty, a submesh is out of range, the
    /// indices don't fit the index format, or the GPU device fails.
    pub fn create_mesh(self: &Arc<Self>, descriptor: &MeshDescriptor) -> Result<Arc<Mesh>, GraphicsError> {
        if descriptor.vertices.is_empty() || descriptor.indices.is_empty() {
            return Err(GraphicsError::InvalidParameter("mesh has no geometry".to_string()));
        }
        if descriptor.vertex_stride == 0 {
            return Err(GraphicsError::InvalidParameter("vertex stride cannot be zero".to_string()));
        }
        let index_count = descriptor.indices.len() as u64;
        if let Some(submesh) = descriptor
            .submeshes
            .iter()
            .find(|s| u64::from(s.start_index) + u64::from(s.index_count) > index_count)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "submesh {submesh:?} exceeds {index_count} indices"
            )));
        }
        let index_bytes = descriptor.index_bytes().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "indices do not fit {:?}",
                descriptor.index_format
            ))
        })?;

        let label = descriptor.label.as_deref().unwrap_or("mesh");
        let vertex_buffer = self.release.create_buffer(
            &BufferDescriptor::new(descriptor.vertices.len() as u64, BufferUsage::VERTEX)
                .with_label(format!("{label}_vertices")),
        )?;
        self.gpu.write_buffer(&vertex_buffer, 0, &descriptor.vertices)?;

        let index_buffer = self.release.create_buffer(
            &BufferDescriptor::new(index_bytes.len() as u64, BufferUsage::INDEX)
                .with_label(format!("{label}_indices")),
        )?;
        self.gpu.write_buffer(&index_buffer, 0, &index_bytes)?;

        let mesh = Arc::new(Mesh::new(Arc::clone(self), descriptor, vertex_buffer, index_buffer));
        self.meshes.write().push(Arc::downgrade(&mesh));

        log::trace!(
            "GraphicsDevice: created mesh {:?}, {} indices, {} submeshes",
            descriptor.label,
            index_count,
            mesh.submeshes().len()
        );

        Ok(mesh)
    }

    /// Reserve storage for a top-level acceleration structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend has no ray tracing, or the GPU device fails.
    pub fn create_acceleration_structure(
        self: &Arc<Self>,
        size: u64,
        label: Option<&str>,
    ) -> Result<Arc<AccelerationStructure>, GraphicsError> {
        if !self.backend.supports_raytracing() {
            return Err(GraphicsError::InvalidParameter(format!(
                "the {} backend has no acceleration structures",
                self.backend.name()
            )));
        }
        let mut descriptor = BufferDescriptor::new(size, BufferUsage::ACCELERATION_STRUCTURE);
        descriptor.label = label.map(str::to_string);
        let buffer = self.release.create_buffer(&descriptor)?;
        Ok(Arc::new(AccelerationStructure::new(
            Arc::clone(self),
            buffer,
            descriptor.label,
        )))
    }

    /// Get the number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.read().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Get the number of live meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.read().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Drop tracking entries of destroyed resources.
    pub fn cleanup_dead_resources(&self) {
        self.textures.write().retain(|w| w.strong_count() > 0);
        self.meshes.write().retain(|w| w.strong_count() > 0);
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.kind())
            .field("gpu", &self.gpu.name())
            .field("frames_in_flight", &self.config.frames_in_flight)
            .field("release", &self.release)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use crate::resources::Submesh;
    use crate::types::{IndexFormat, TextureFormat};

    #[test]
    fn test_invalid_config_rejected() {
        let config = BindingConfig::default().with_frames_in_flight(0);
        assert!(GraphicsDevice::headless(config).is_err());
    }

    #[test]
    fn test_resource_tracking() {
        let (device, gpu) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm))
            .unwrap();
        assert_eq!(device.texture_count(), 1);
        assert_eq!(gpu.texture_count(), 1);

        drop(texture);
        assert_eq!(device.texture_count(), 0);
        device.cleanup_dead_resources();

        // The GPU texture outlives the frames that may still sample it.
        assert_eq!(gpu.texture_count(), 1);
        device.begin_frame(2);
        assert_eq!(gpu.texture_count(), 0);
    }

    #[test]
    fn test_dropped_mesh_releases_buffers() {
        let (device, gpu) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let mesh = device
            .create_mesh(&MeshDescriptor::new(vec![0; 36], 12, vec![0, 1, 2]))
            .unwrap();
        assert_eq!(gpu.buffer_count(), 2);

        device.begin_frame(1);
        drop(mesh);
        device.begin_frame(2);
        assert_eq!(gpu.buffer_count(), 2);
        device.begin_frame(3);
        assert_eq!(gpu.buffer_count(), 0);
        assert_eq!(device.release_queue().pending_count(), 0);
    }

    #[test]
    fn test_texture_validation() {
        let (device, _) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let zero = TextureDescriptor::new_2d(0, 16, TextureFormat::Rgba8Unorm);
        assert!(device.create_texture(&zero).is_err());
        let huge = TextureDescriptor::new_2d(32768, 16, TextureFormat::Rgba8Unorm);
        assert!(device.create_texture(&huge).is_err());
    }

    #[test]
    fn test_mesh_upload() {
        let (device, gpu) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let descriptor = MeshDescriptor::new(vec![7; 36], 12, vec![0, 1, 2, 2, 1, 0])
            .with_index_format(IndexFormat::Uint16)
            .with_submesh(Submesh::new(0, 3))
            .with_submesh(Submesh::new(3, 3));
        let mesh = device.create_mesh(&descriptor).unwrap();

        assert_eq!(mesh.submeshes().len(), 2);
        let indices = gpu.read_buffer(mesh.index_buffer(), 0, 12).unwrap();
        assert_eq!(&indices[..4], &[0, 0, 1, 0]);

        let bad = MeshDescriptor::new(vec![0; 12], 12, vec![0]).with_submesh(Submesh::new(0, 3));
        assert!(device.create_mesh(&bad).is_err());
    }

    #[test]
    fn test_acceleration_structure_needs_explicit_backend() {
        let (device, _) = GraphicsDevice::headless(BindingConfig::new(BackendType::Implicit)).unwrap();
        assert!(device.create_acceleration_structure(1024, None).is_err());

        let (device, _) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let tlas = device.create_acceleration_structure(1024, Some("tlas")).unwrap();
        assert_ne!(tlas.address(), 0);
    }
}
