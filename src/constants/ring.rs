//! Per-frame ring allocation of constant buffer memory.
//!
//! Every declared constant buffer of a program gets one CPU-writable GPU
//! buffer holding `capacity` slots for each frame in flight:
//!
//! ```text
//! | frame 0: slot 0 | slot 1 | ... | frame 1: slot 0 | slot 1 | ... |
//! ```
//!
//! Each draw that needs fresh constants takes the next slot of the current
//! frame's partition. The cursor is reset once per frame boundary, never
//! between draws, so slots the GPU may still read for an earlier frame are
//! left alone. Running out of slots is an error; the ring never wraps.
//! Dropping the ring retires its buffer, so it outlives the frames in flight.

use std::sync::Arc;

use crate::backend::{GpuAddress, GpuBuffer, GpuDevice, OwnedBuffer, ReleaseQueue};
use crate::error::{CapacityError, DeviceError, GraphicsError};
use crate::types::{BufferDescriptor, BufferUsage};

use super::layout::align_up;

/// A slot handed out by [`ConstantBufferRing::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingSlot {
    /// Slot index within the frame partition.
    pub index: u32,
    /// Byte offset from the start of the ring buffer.
    pub offset: u64,
    /// GPU address of the slot.
    pub address: GpuAddress,
}

/// Ring of constant-buffer slots for one declared constant buffer.
pub struct ConstantBufferRing {
    name: String,
    buffer: OwnedBuffer,
    layout_size: u32,
    slot_stride: u64,
    capacity: u32,
    frames_in_flight: u32,
    partition: u32,
    cursor: u32,
    current: Option<RingSlot>,
    last_frame: Option<u64>,
    staging: Vec<u8>,
    dirty: bool,
}

impl ConstantBufferRing {
    /// Default slot placement alignment (256 bytes).
    ///
    /// This matches the constant buffer placement alignment of root CBVs and
    /// the first-constant granularity of slot constant buffers.
    pub const DEFAULT_SLOT_ALIGNMENT: u64 = 256;

    /// Create a ring for a constant buffer of `layout_size` bytes.
    pub fn new(
        queue: &Arc<ReleaseQueue>,
        name: &str,
        layout_size: u32,
        capacity: u32,
        frames_in_flight: u32,
    ) -> Result<Self, GraphicsError> {
        Self::with_alignment(
            queue,
            name,
            layout_size,
            capacity,
            frames_in_flight,
            Self::DEFAULT_SLOT_ALIGNMENT,
        )
    }

    /// Create a ring with a custom slot alignment (must be a power of 2).
    pub fn with_alignment(
        queue: &Arc<ReleaseQueue>,
        name: &str,
        layout_size: u32,
        capacity: u32,
        frames_in_flight: u32,
        alignment: u64,
    ) -> Result<Self, GraphicsError> {
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }
        if capacity == 0 || frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "ring for '{name}' needs at least one slot and one frame"
            )));
        }
        if layout_size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "constant buffer '{name}' has zero size"
            )));
        }

        let slot_stride = align_up(u64::from(layout_size), alignment);
        let size = slot_stride * u64::from(capacity) * u64::from(frames_in_flight);
        let descriptor = BufferDescriptor::new(size, BufferUsage::CONSTANT | BufferUsage::UPLOAD)
            .with_label(format!("{name}_ring"));
        let buffer = queue.create_buffer(&descriptor)?;

        log::debug!(
            "created ring for '{name}': {capacity} slots x {frames_in_flight} frames, stride {slot_stride}"
        );

        Ok(Self {
            name: name.to_string(),
            buffer,
            layout_size,
            slot_stride,
            capacity,
            frames_in_flight,
            partition: 0,
            cursor: 0,
            current: None,
            last_frame: None,
            staging: vec![0; layout_size as usize],
            dirty: false,
        })
    }

    /// Name of the constant buffer this ring serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying GPU buffer.
    pub fn buffer(&self) -> &GpuBuffer {
        self.buffer.buffer()
    }

    /// Byte size of one constant buffer instance.
    pub fn layout_size(&self) -> u32 {
        self.layout_size
    }

    /// Distance between consecutive slots.
    pub fn slot_stride(&self) -> u64 {
        self.slot_stride
    }

    /// Slots per frame.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Frame partition currently allocated from.
    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Slots used in the current frame.
    pub fn used(&self) -> u32 {
        self.cursor
    }

    /// Slots left in the current frame.
    pub fn remaining(&self) -> u32 {
        self.capacity - self.cursor
    }

    /// The slot selected by the last allocation this frame.
    pub fn current(&self) -> Option<RingSlot> {
        self.current
    }

    /// Start a new frame. Repeated or stale frame numbers are ignored.
    pub fn begin_frame(&mut self, frame: u64) {
        if let Some(last) = self.last_frame {
            if frame <= last {
                log::warn!(
                    "ring '{}': ignoring begin_frame({frame}), already at frame {last}",
                    self.name
                );
                return;
            }
        }
        self.last_frame = Some(frame);
        self.partition = (frame % u64::from(self.frames_in_flight)) as u32;
        self.cursor = 0;
        self.current = None;
    }

    /// Take the next slot of the current frame.
    ///
    /// The ring is dirty afterwards: the slot gets the CPU copy on the next upload.
    pub fn allocate(&mut self) -> Result<RingSlot, CapacityError> {
        if self.cursor >= self.capacity {
            return Err(CapacityError {
                buffer: self.name.clone(),
                capacity: self.capacity,
            });
        }

        let index = self.cursor;
        let offset = (u64::from(self.partition) * u64::from(self.capacity) + u64::from(index))
            * self.slot_stride;
        let slot = RingSlot {
            index,
            offset,
            address: self.buffer.address() + offset,
        };

        self.cursor += 1;
        self.current = Some(slot);
        // The new slot holds stale GPU data until the next upload.
        self.dirty = true;
        Ok(slot)
    }

    /// The current slot, allocating one if none was taken this frame.
    ///
    /// Returns whether a slot was newly allocated.
    pub fn current_or_allocate(&mut self) -> Result<(RingSlot, bool), CapacityError> {
        match self.current {
            Some(slot) => Ok((slot, false)),
            None => self.allocate().map(|slot| (slot, true)),
        }
    }

    /// CPU copy of the constants for the current slot.
    ///
    /// Values persist across allocations, so a new slot starts with the
    /// previous object's constants.
    pub fn staging(&self) -> &[u8] {
        &self.staging
    }

    /// Mutable CPU copy. Marks the ring dirty.
    pub(crate) fn staging_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.staging
    }

    /// Whether the CPU copy changed since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Copy the CPU constants into the current slot's GPU memory.
    pub fn upload(&mut self, device: &dyn GpuDevice) -> Result<(), DeviceError> {
        let Some(slot) = self.current else {
            return Err(DeviceError::InvalidArgument(format!(
                "'{}' has no allocated slot to upload to",
                self.name
            )));
        };
        device.write_buffer(self.buffer.buffer(), slot.offset, &self.staging)?;
        self.dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for ConstantBufferRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantBufferRing")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("frames_in_flight", &self.frames_in_flight)
            .field("partition", &self.partition)
            .field("cursor", &self.cursor)
            .field("slot_stride", &self.slot_stride)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;

    fn release_queue() -> (Arc<HeadlessDevice>, Arc<ReleaseQueue>) {
        let device = Arc::new(HeadlessDevice::new());
        let queue = Arc::new(ReleaseQueue::new(device.clone(), 2));
        (device, queue)
    }

    fn create_ring(queue: &Arc<ReleaseQueue>, capacity: u32, frames: u32) -> ConstantBufferRing {
        ConstantBufferRing::new(queue, "cbPerObject", 96, capacity, frames).unwrap()
    }

    #[test]
    fn test_ring_creation() {
        let (_, queue) = release_queue();
        let ring = create_ring(&queue, 4, 2);

        assert_eq!(ring.slot_stride(), 256);
        assert_eq!(ring.buffer().size(), 256 * 4 * 2);
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.remaining(), 4);
        assert!(ring.current().is_none());
        assert_eq!(ring.staging().len(), 96);
    }

    #[test]
    fn test_ring_allocation() {
        let (_, queue) = release_queue();
        let mut ring = create_ring(&queue, 4, 2);

        let first = ring.allocate().unwrap();
        assert_eq!((first.index, first.offset), (0, 0));
        let second = ring.allocate().unwrap();
        assert_eq!((second.index, second.offset), (1, 256));
        assert_eq!(second.address, ring.buffer().address() + 256);
        assert_eq!(ring.current(), Some(second));
    }

    #[test]
    fn test_ring_exhaustion_never_wraps() {
        let (_, queue) = release_queue();
        let mut ring = create_ring(&queue, 2, 1);

        ring.allocate().unwrap();
        ring.allocate().unwrap();
        let err = ring.allocate().unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(err.buffer, "cbPerObject");
        assert_eq!(ring.used(), 2);
    }

    #[test]
    fn test_frames_use_disjoint_partitions() {
        let (_, queue) = release_queue();
        let mut ring = create_ring(&queue, 4, 2);

        ring.begin_frame(1);
        let frame1 = ring.allocate().unwrap();
        ring.begin_frame(2);
        let frame2 = ring.allocate().unwrap();
        ring.begin_frame(3);
        let frame3 = ring.allocate().unwrap();

        assert_eq!(frame1.offset, 4 * 256);
        assert_eq!(frame2.offset, 0);
        assert_eq!(frame3.offset, frame1.offset);
    }

    #[test]
    fn test_repeated_begin_frame_does_not_reset() {
        let (_, queue) = release_queue();
        let mut ring = create_ring(&queue, 4, 2);

        ring.begin_frame(5);
        ring.allocate().unwrap();
        ring.begin_frame(5);
        ring.begin_frame(4);
        assert_eq!(ring.used(), 1);

        ring.begin_frame(6);
        assert_eq!(ring.used(), 0);
        assert!(ring.current().is_none());
    }

    #[test]
    fn test_upload_writes_current_slot() {
        let (device, queue) = release_queue();
        let mut ring = create_ring(&queue, 4, 1);

        assert!(ring.upload(device.as_ref()).is_err());

        ring.allocate().unwrap();
        let slot = ring.allocate().unwrap();
        ring.staging_mut()[..4].copy_from_slice(&7u32.to_le_bytes());
        assert!(ring.is_dirty());
        ring.upload(device.as_ref()).unwrap();
        assert!(!ring.is_dirty());

        assert_eq!(
            device.read_address(slot.address, 4),
            Some(7u32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn test_invalid_alignment() {
        let (_, queue) = release_queue();
        let result = ConstantBufferRing::with_alignment(&queue, "cb", 16, 4, 1, 100);
        assert!(result.is_err());
    }

    #[test]
    fn test_dropped_ring_retires_buffer() {
        let (device, queue) = release_queue();
        let ring = create_ring(&queue, 4, 2);
        assert_eq!(device.buffer_count(), 1);

        drop(ring);
        assert_eq!(queue.pending_count(), 1);
        queue.begin_frame(2);
        assert_eq!(device.buffer_count(), 0);
    }
}
