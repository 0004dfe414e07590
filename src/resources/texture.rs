//! GPU texture resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CommandList, GpuTexture, RenderCommand};
use crate::device::GraphicsDevice;
use crate::types::{ResourceDimension, ResourceState, TextureDescriptor, TextureFormat};

/// A GPU texture, or a buffer viewed as a shader resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and shared by
/// `Arc` between materials and passes. Each texture tracks its current
/// resource state so the explicit backend can record barriers. Dropping the
/// last reference retires the GPU texture to the device's release queue.
///
/// # Example
///
/// ```ignore
/// let albedo = device.create_texture(
///     &TextureDescriptor::new_2d(1024, 1024, TextureFormat::Rgba8UnormSrgb)
///         .with_label("textures/brick_albedo.png"),
/// )?;
/// material.set_texture("gAlbedo", &albedo);
/// ```
pub struct Texture {
    device: Arc<GraphicsDevice>,
    gpu: GpuTexture,
    descriptor: TextureDescriptor,
    state: Mutex<ResourceState>,
}

impl Texture {
    /// Create a new texture (called by GraphicsDevice).
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        gpu: GpuTexture,
        descriptor: TextureDescriptor,
    ) -> Self {
        Self {
            device,
            gpu,
            descriptor,
            state: Mutex::new(ResourceState::Common),
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Device id of the texture.
    pub fn id(&self) -> u64 {
        self.gpu.id()
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn dimension(&self) -> ResourceDimension {
        self.descriptor.dimension
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Last state recorded for this texture.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Record a barrier if the texture is not already in `after`.
    pub(crate) fn transition(&self, commands: &mut CommandList, after: ResourceState) {
        let mut state = self.state.lock();
        if *state == after {
            return;
        }
        commands.push(RenderCommand::ResourceBarrier {
            texture: self.id(),
            before: *state,
            after,
        });
        *state = after;
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.release_queue().retire_texture(self.gpu);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.gpu.id())
            .field("dimension", &self.descriptor.dimension)
            .field("format", &self.descriptor.format)
            .field("size", &(self.descriptor.width, self.descriptor.height))
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);
