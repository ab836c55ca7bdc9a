use std::io;
use std::ptr::NonNull;
use std::time::Duration;

use crate::buffer::{Dequeued, Description};
use crate::{Capabilities, Format};

pub mod handle;
pub use handle::Handle;

pub mod session;
pub use session::{Session, SessionConfig, State};

/// Outcome of waiting for the driver to fill a buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// At least one buffer can be dequeued without blocking
    Ready,
    /// The timeout elapsed first
    TimedOut,
}

/// The driver calls the capture engine is built on
///
/// [`Handle`] talks to a real video4linux node. Anything else implementing this trait (e.g. a
/// scripted fake in tests) can stand in for it, the engine never touches a file descriptor
/// directly.
///
/// All buffer related calls refer to single-planar video capture buffers using memory-mapped
/// I/O.
///
/// # Safety
///
/// A pointer returned by [`Driver::map`] must stay valid for reads of the `length` reported by
/// the corresponding [`Description`] until it is handed to [`Driver::unmap`].
pub unsafe trait Driver {
    /// Query for device capabilities (VIDIOC_QUERYCAP)
    fn query_caps(&self) -> io::Result<Capabilities>;

    /// Modifies the capture format and returns the actual format (VIDIOC_S_FMT)
    ///
    /// The driver tries to match the format parameters on a best effort basis.
    /// Thus, if the combination of format properties cannot be achieved, the closest possible
    /// settings are used and reported back.
    fn set_format(&self, fmt: &Format) -> io::Result<Format>;

    /// Asks the driver for `count` buffers and returns how many it granted (VIDIOC_REQBUFS)
    ///
    /// A count of zero frees all buffers.
    fn request_buffers(&self, count: u32) -> io::Result<u32>;

    /// Returns length and mapping offset of a buffer (VIDIOC_QUERYBUF)
    fn query_buffer(&self, index: u32) -> io::Result<Description>;

    /// Maps a buffer into the address space of this process
    fn map(&self, desc: &Description) -> io::Result<NonNull<u8>>;

    /// Unmaps a region previously returned by [`Driver::map`]
    ///
    /// # Safety
    ///
    /// No reference into the region may outlive this call.
    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()>;

    /// Insert a buffer into the drivers' incoming queue (VIDIOC_QBUF)
    fn queue(&self, index: u32) -> io::Result<()>;

    /// Remove a buffer from the drivers' outgoing queue (VIDIOC_DQBUF)
    fn dequeue(&self) -> io::Result<Dequeued>;

    /// Start streaming (VIDIOC_STREAMON)
    fn stream_on(&self) -> io::Result<()>;

    /// Stop streaming (VIDIOC_STREAMOFF)
    ///
    /// Per driver contract, this implicitly dequeues every buffer.
    fn stream_off(&self) -> io::Result<()>;

    /// Blocks until a filled buffer is available or `timeout` elapses
    fn wait(&self, timeout: Duration) -> io::Result<Readiness>;
}
