//! Ring of driver-owned, memory-mapped frame buffers plus the head buffer.
//!
//! Each slot is owned by exactly one side at a time. A slot handed back by
//! the driver is copied into the head buffer and queued again before
//! [`BufferRing::capture_into_head`] returns, so the application only ever
//! holds the head buffer.

use std::io;

use crate::error::{CameraError, Result};
use crate::traits::{retry_interrupted, FrameMetadata, VideoDriver};

/// Number of buffers requested when none is configured.
pub const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Which side currently owns a ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Queued to the driver, which may be writing into it.
    Driver,
    /// Held by the application.
    Application,
}

/// One mapped driver buffer.
#[derive(Debug)]
pub struct Slot<B> {
    index: u32,
    length: usize,
    mapping: B,
    owner: Owner,
}

impl<B> Slot<B> {
    /// Driver buffer index.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Mapped length in bytes.
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Whether the mapping is empty.
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current owner.
    pub const fn owner(&self) -> Owner {
        self.owner
    }
}

/// Mapped buffer ring and head buffer for one device.
#[derive(Debug)]
pub struct BufferRing<B> {
    slots: Vec<Slot<B>>,
    head: Vec<u8>,
    head_len: usize,
    metadata: FrameMetadata,
    requeue_failure: Option<CameraError>,
}

impl<B> Default for BufferRing<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> BufferRing<B> {
    /// An empty ring with no mappings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: Vec::new(),
            head_len: 0,
            metadata: FrameMetadata {
                sequence: 0,
                timestamp: std::time::Duration::ZERO,
                bytes_used: 0,
            },
            requeue_failure: None,
        }
    }

    /// Whether buffers are currently mapped.
    pub fn is_prepared(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of mapped slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Mapped slots in index order.
    pub fn slots(&self) -> &[Slot<B>] {
        &self.slots
    }

    /// Allocated size of the head buffer (the largest slot length).
    pub fn head_capacity(&self) -> usize {
        self.head.len()
    }

    /// The most recently captured frame; empty before the first capture.
    pub fn head(&self) -> &[u8] {
        self.head.get(..self.head_len).unwrap_or_default()
    }

    /// Metadata of the most recently captured frame.
    pub const fn metadata(&self) -> FrameMetadata {
        self.metadata
    }

    /// Number of slots held by the application.
    pub fn held(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.owner == Owner::Application)
            .count()
    }

    /// The requeue error from the last capture, if its slot could not be
    /// handed back to the driver.
    pub fn take_requeue_failure(&mut self) -> Option<CameraError> {
        self.requeue_failure.take()
    }

    /// Unmap every slot and free the head buffer. Safe to call on an empty ring.
    pub fn teardown(&mut self) {
        if !self.slots.is_empty() {
            log::debug!("unmapping {} buffers", self.slots.len());
        }
        self.slots.clear();
        self.head = Vec::new();
        self.head_len = 0;
        self.metadata = FrameMetadata::default();
        self.requeue_failure = None;
    }

    /// Mark every slot as returned to the application, e.g. after stream-off.
    pub fn reclaim_all(&mut self) {
        for slot in &mut self.slots {
            slot.owner = Owner::Application;
        }
    }
}

impl<B: AsRef<[u8]>> BufferRing<B> {
    /// Request `count` buffers and map every slot the driver grants.
    ///
    /// Any existing ring is torn down first. On failure no slot stays mapped
    /// and a granted reservation is handed back with `REQBUFS 0`.
    pub fn prepare<D>(&mut self, driver: &mut D, count: u32) -> Result<()>
    where
        D: VideoDriver<Buffer = B>,
    {
        self.teardown();

        let granted = retry_interrupted(|| driver.request_buffers(count)).map_err(|source| {
            CameraError::Buffer {
                request: "VIDIOC_REQBUFS",
                source,
            }
        })?;
        if granted == 0 {
            return Err(CameraError::Buffer {
                request: "VIDIOC_REQBUFS",
                source: io::Error::new(io::ErrorKind::OutOfMemory, "driver granted no buffers"),
            });
        }

        let slots = match Self::map_slots(driver, granted) {
            Ok(slots) => slots,
            Err(err) => {
                if let Err(release) = retry_interrupted(|| driver.request_buffers(0)) {
                    log::warn!("releasing {granted} buffers after failed mapping: {release}");
                }
                return Err(err);
            }
        };

        let max_len = slots.iter().map(|slot| slot.length).max().unwrap_or(0);
        log::debug!("mapped {granted} of {count} requested buffers, head buffer {max_len} bytes");
        self.slots = slots;
        self.head = vec![0; max_len];
        Ok(())
    }

    fn map_slots<D>(driver: &mut D, granted: u32) -> Result<Vec<Slot<B>>>
    where
        D: VideoDriver<Buffer = B>,
    {
        let mut slots = Vec::with_capacity(granted as usize);
        for index in 0..granted {
            // Dropping `slots` on the error paths unmaps what was mapped so far.
            let info = retry_interrupted(|| driver.query_buffer(index)).map_err(|source| {
                CameraError::Buffer {
                    request: "VIDIOC_QUERYBUF",
                    source,
                }
            })?;
            let mapping = driver
                .map_buffer(&info)
                .map_err(|source| CameraError::Buffer {
                    request: "mmap",
                    source,
                })?;
            slots.push(Slot {
                index,
                length: mapping.as_ref().len(),
                mapping,
                owner: Owner::Application,
            });
        }
        Ok(slots)
    }

    /// Queue every application-owned slot to the driver.
    pub fn queue_all<D>(&mut self, driver: &mut D) -> Result<()>
    where
        D: VideoDriver<Buffer = B>,
    {
        for slot in &mut self.slots {
            if slot.owner == Owner::Driver {
                continue;
            }
            retry_interrupted(|| driver.queue_buffer(slot.index)).map_err(|source| {
                CameraError::Stream {
                    request: "VIDIOC_QBUF",
                    source,
                }
            })?;
            slot.owner = Owner::Driver;
        }
        Ok(())
    }

    /// Dequeue a filled slot, copy it into the head buffer and queue it again.
    ///
    /// Returns `Ok(false)` when the driver has no frame ready yet; the caller
    /// should wait for the descriptor to become readable and retry.
    ///
    /// A slot whose requeue failed stays with the application and is queued
    /// again before the next dequeue; the failure is kept for
    /// [`take_requeue_failure`](Self::take_requeue_failure).
    pub fn capture_into_head<D>(&mut self, driver: &mut D) -> Result<bool>
    where
        D: VideoDriver<Buffer = B>,
    {
        if self.held() > 0 {
            self.queue_all(driver)?;
        }

        let filled = match retry_interrupted(|| driver.dequeue_buffer()) {
            Ok(filled) => filled,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(source) => {
                return Err(CameraError::Buffer {
                    request: "VIDIOC_DQBUF",
                    source,
                })
            }
        };

        let slot = self
            .slots
            .get_mut(filled.index as usize)
            .ok_or_else(|| CameraError::Buffer {
                request: "VIDIOC_DQBUF",
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("driver returned unknown buffer index {}", filled.index),
                ),
            })?;
        slot.owner = Owner::Application;

        let data = slot.mapping.as_ref();
        let len = (filled.bytes_used as usize)
            .min(data.len())
            .min(self.head.len());
        if let (Some(dst), Some(src)) = (self.head.get_mut(..len), data.get(..len)) {
            dst.copy_from_slice(src);
        }
        self.head_len = len;
        self.metadata = FrameMetadata {
            sequence: filled.sequence,
            timestamp: filled.timestamp,
            #[allow(clippy::cast_possible_truncation)]
            bytes_used: len as u32,
        };

        match retry_interrupted(|| driver.queue_buffer(slot.index)) {
            Ok(()) => slot.owner = Owner::Driver,
            Err(source) => {
                log::warn!("slot {} not requeued: {source}", slot.index);
                self.requeue_failure = Some(CameraError::Buffer {
                    request: "VIDIOC_QBUF",
                    source,
                });
            }
        }
        Ok(true)
    }
}
