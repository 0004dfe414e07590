//! Deferred release of GPU memory.
//!
//! The GPU may still read a buffer or texture recorded in frame `N` until
//! frame `N + frames_in_flight` begins. Dropping an [`OwnedBuffer`] (or a
//! [`Texture`](crate::Texture)) therefore only retires the object into the
//! [`ReleaseQueue`]; the queue destroys it on the device once the frame loop
//! has moved past every frame that could reference it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::types::BufferDescriptor;

use super::{GpuBuffer, GpuDevice, GpuTexture};

#[derive(Debug, Clone, Copy)]
enum Retired {
    Buffer(GpuBuffer),
    Texture(GpuTexture),
}

#[derive(Debug, Default)]
struct ReleaseState {
    frame: u64,
    pending: Vec<(u64, Retired)>,
}

/// Holds retired GPU objects until no frame in flight can use them.
pub struct ReleaseQueue {
    gpu: Arc<dyn GpuDevice>,
    frames_in_flight: u64,
    state: Mutex<ReleaseState>,
}

impl ReleaseQueue {
    pub fn new(gpu: Arc<dyn GpuDevice>, frames_in_flight: u32) -> Self {
        Self {
            gpu,
            frames_in_flight: u64::from(frames_in_flight.max(1)),
            state: Mutex::new(ReleaseState::default()),
        }
    }

    /// The device objects are created on and destroyed through.
    pub fn gpu(&self) -> &dyn GpuDevice {
        self.gpu.as_ref()
    }

    /// Create a buffer that is retired here when dropped.
    pub fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<OwnedBuffer, DeviceError> {
        let buffer = self.gpu.create_buffer(descriptor)?;
        Ok(OwnedBuffer {
            buffer,
            queue: Arc::clone(self),
        })
    }

    pub(crate) fn retire_buffer(&self, buffer: GpuBuffer) {
        self.retire(Retired::Buffer(buffer));
    }

    pub(crate) fn retire_texture(&self, texture: GpuTexture) {
        self.retire(Retired::Texture(texture));
    }

    fn retire(&self, object: Retired) {
        let mut state = self.state.lock();
        let frame = state.frame;
        log::trace!("ReleaseQueue: retiring {object:?} in frame {frame}");
        state.pending.push((frame, object));
    }

    /// Start a frame and destroy everything retired `frames_in_flight`
    /// frames ago or earlier. Returns the number of objects destroyed.
    pub fn begin_frame(&self, frame: u64) -> usize {
        let expired: Vec<Retired> = {
            let mut state = self.state.lock();
            state.frame = state.frame.max(frame);
            let current = state.frame;
            let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|(retired, _)| retired + self.frames_in_flight <= current);
            state.pending = pending;
            expired.into_iter().map(|(_, object)| object).collect()
        };

        for object in &expired {
            self.destroy(*object);
        }
        if !expired.is_empty() {
            log::debug!("ReleaseQueue: destroyed {} objects at frame {frame}", expired.len());
        }
        expired.len()
    }

    /// Objects waiting for their frames to retire.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn destroy(&self, object: Retired) {
        match object {
            Retired::Buffer(buffer) => self.gpu.destroy_buffer(&buffer),
            Retired::Texture(texture) => self.gpu.destroy_texture(&texture),
        }
    }
}

impl Drop for ReleaseQueue {
    fn drop(&mut self) {
        // Nothing can record against these objects once every owner is gone.
        for (_, object) in std::mem::take(&mut self.state.get_mut().pending) {
            self.destroy(object);
        }
    }
}

impl std::fmt::Debug for ReleaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReleaseQueue")
            .field("gpu", &self.gpu.name())
            .field("frames_in_flight", &self.frames_in_flight)
            .field("frame", &state.frame)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// A device buffer retired into its [`ReleaseQueue`] on drop.
pub struct OwnedBuffer {
    buffer: GpuBuffer,
    queue: Arc<ReleaseQueue>,
}

impl OwnedBuffer {
    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }
}

impl std::ops::Deref for OwnedBuffer {
    type Target = GpuBuffer;

    fn deref(&self) -> &GpuBuffer {
        &self.buffer
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        self.queue.retire_buffer(self.buffer);
    }
}

impl std::fmt::Debug for OwnedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("id", &self.buffer.id())
            .field("size", &self.buffer.size())
            .field("address", &format_args!("{:#x}", self.buffer.address()))
            .finish()
    }
}

// Ensure release types are Send + Sync
static_assertions::assert_impl_all!(ReleaseQueue: Send, Sync);
static_assertions::assert_impl_all!(OwnedBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use crate::types::BufferUsage;

    fn queue(frames: u32) -> (Arc<HeadlessDevice>, Arc<ReleaseQueue>) {
        let gpu = Arc::new(HeadlessDevice::new());
        let queue = Arc::new(ReleaseQueue::new(gpu.clone(), frames));
        (gpu, queue)
    }

    #[test]
    fn test_release_waits_for_frames_in_flight() {
        let (gpu, queue) = queue(2);
        queue.begin_frame(3);
        let buffer = queue
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UPLOAD))
            .unwrap();
        assert_eq!(gpu.buffer_count(), 1);

        drop(buffer);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(gpu.buffer_count(), 1);

        assert_eq!(queue.begin_frame(4), 0);
        assert_eq!(gpu.buffer_count(), 1);
        assert_eq!(queue.begin_frame(5), 1);
        assert_eq!(gpu.buffer_count(), 0);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_stale_frame_does_not_release() {
        let (gpu, queue) = queue(1);
        queue.begin_frame(10);
        drop(
            queue
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::UPLOAD))
                .unwrap(),
        );
        assert_eq!(queue.begin_frame(2), 0);
        assert_eq!(gpu.buffer_count(), 1);
        assert_eq!(queue.begin_frame(11), 1);
    }

    #[test]
    fn test_dropping_queue_destroys_pending() {
        let (gpu, queue) = queue(3);
        drop(
            queue
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::UPLOAD))
                .unwrap(),
        );
        drop(queue);
        assert_eq!(gpu.buffer_count(), 0);
    }
}
