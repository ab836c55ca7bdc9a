use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::{Metadata, Ownership};
use crate::device::Driver;
use crate::error::{AllocationError, CaptureError, Result};
use crate::io::mmap::Buffer;

/// Manage mapped buffers
///
/// The arena owns every region shared with the driver. Each region is mapped exactly once in
/// [`Arena::allocate`] and unmapped exactly once in [`Arena::release`] (or the Drop impl, if the
/// owner never got around to it).
pub struct Arena<D: Driver> {
    handle: Arc<D>,
    bufs: Vec<Buffer>,
    released: bool,
}

impl<D: Driver> Arena<D> {
    /// Requests and maps `count` buffers
    ///
    /// All buffers start out application owned, they are not queued yet. If anything goes wrong
    /// halfway through, every region mapped so far is unmapped and the driver buffers are freed
    /// before the error is returned.
    ///
    /// # Arguments
    ///
    /// * `handle` - Device the buffers belong to
    /// * `count` - Number of buffers, the driver has to grant at least that many
    pub fn allocate(handle: Arc<D>, count: u32) -> std::result::Result<Self, AllocationError> {
        let granted = handle
            .request_buffers(count)
            .map_err(|source| AllocationError::Request { count, source })?;

        let mut arena = Arena {
            handle,
            bufs: Vec::with_capacity(count as usize),
            released: false,
        };

        if granted < count {
            arena.unwind();
            return Err(AllocationError::Insufficient {
                requested: count,
                granted,
            });
        }
        if granted > count {
            debug!(granted, count, "driver granted extra buffers, leaving them unused");
        }

        for index in 0..count {
            if let Err(e) = arena.map(index) {
                arena.unwind();
                return Err(e);
            }
        }

        Ok(arena)
    }

    fn map(&mut self, index: u32) -> std::result::Result<(), AllocationError> {
        let desc = self
            .handle
            .query_buffer(index)
            .map_err(|source| AllocationError::Query { index, source })?;
        let ptr = self
            .handle
            .map(&desc)
            .map_err(|source| AllocationError::Map { index, source })?;

        debug!(index, length = desc.length, "mapped buffer");
        self.bufs.push(Buffer::new(index, ptr, desc.length as usize));
        Ok(())
    }

    /// Undo a partial allocation, nothing has been queued yet
    fn unwind(&mut self) {
        for buf in self.bufs.drain(..) {
            if let Err(e) = unsafe { self.handle.unmap(buf.ptr(), buf.len()) } {
                warn!(index = buf.index(), "munmap failed while unwinding: {}", e);
            }
        }
        if let Err(e) = self.handle.request_buffers(0) {
            warn!("freeing driver buffers failed while unwinding: {}", e);
        }
        self.released = true;
    }

    /// Number of buffers in the pool
    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    /// Whether the pool holds no buffers (anymore)
    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Whether the pool has been released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Access a single buffer
    pub fn get(&self, index: u32) -> Option<&Buffer> {
        self.bufs.get(index as usize)
    }

    /// Access all buffers
    pub fn buffers(&self) -> &[Buffer] {
        &self.bufs
    }

    /// Returns the number of buffers currently held by `owner`
    pub fn count_owned_by(&self, owner: Ownership) -> usize {
        self.bufs.iter().filter(|buf| buf.owner() == owner).count()
    }

    fn get_mut(&mut self, index: u32) -> Result<&mut Buffer> {
        let count = self.bufs.len();
        self.bufs
            .get_mut(index as usize)
            .ok_or(CaptureError::InvalidIndex { index, count })
    }

    fn transition(&mut self, index: u32, from: Ownership, to: Ownership) -> Result<&mut Buffer> {
        let buf = self.get_mut(index)?;
        if buf.owner() != from {
            return Err(CaptureError::OwnershipViolation {
                index,
                expected: from,
                actual: buf.owner(),
            });
        }

        buf.set_owner(to);
        Ok(buf)
    }

    /// Record that a buffer was handed to the driver
    pub(crate) fn mark_queued(&mut self, index: u32) -> Result<()> {
        self.transition(index, Ownership::Application, Ownership::Driver)?;
        Ok(())
    }

    /// Record that the driver handed a filled buffer back
    pub(crate) fn mark_dequeued(&mut self, index: u32, meta: Metadata) -> Result<()> {
        self.transition(index, Ownership::Driver, Ownership::Application)?
            .set_meta(meta);
        Ok(())
    }

    /// Give up on an application owned buffer that could not be queued again
    ///
    /// From now on the buffer counts as driver owned, so it is never read again. Stream-off
    /// hands it back like every other buffer.
    pub(crate) fn retire(&mut self, index: u32) -> Result<()> {
        self.transition(index, Ownership::Application, Ownership::Driver)?;
        Ok(())
    }

    /// Hand every buffer back to the application, to be called after stream-off only
    pub(crate) fn reclaim_all(&mut self) {
        for buf in &mut self.bufs {
            buf.set_owner(Ownership::Application);
        }
    }

    pub(crate) fn data(&self, index: u32) -> Option<&[u8]> {
        self.get(index)?.data()
    }

    /// Release all buffers
    ///
    /// Every region is unmapped exactly once and the driver buffers are freed. This refuses to
    /// run while the driver still holds any buffer. Calling it again afterwards is a no-op.
    ///
    /// All regions are unmapped even if some fail, the first error is returned.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        let in_flight = self.count_owned_by(Ownership::Driver);
        if in_flight > 0 {
            return Err(CaptureError::BuffersInFlight { count: in_flight });
        }

        let mut result = Ok(());
        for buf in self.bufs.drain(..) {
            if let Err(source) = unsafe { self.handle.unmap(buf.ptr(), buf.len()) } {
                warn!(index = buf.index(), "munmap failed: {}", source);
                if result.is_ok() {
                    result = Err(CaptureError::Teardown {
                        call: "munmap",
                        index: Some(buf.index()),
                        source,
                    });
                }
            }
        }

        if let Err(source) = self.handle.request_buffers(0) {
            warn!("freeing driver buffers failed: {}", source);
            if result.is_ok() {
                result = Err(CaptureError::Teardown {
                    call: "VIDIOC_REQBUFS",
                    index: None,
                    source,
                });
            }
        }

        self.released = true;
        debug!("buffer pool released");
        result
    }
}

impl<D: Driver> Drop for Arena<D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        if self.count_owned_by(Ownership::Driver) > 0 {
            // Still streaming, the driver has to let go before we may unmap anything.
            if let Err(e) = self.handle.stream_off() {
                warn!("stream-off failed while dropping the buffer pool: {}", e);
            }
            self.reclaim_all();
        }

        if let Err(e) = self.release() {
            warn!("failed to release buffer pool: {}", e);
        }
    }
}
