use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::time::Duration;
use std::{io, mem};

use tracing::warn;

use crate::buffer::{Dequeued, Description, Metadata};
use crate::device::{Driver, Readiness};
use crate::v4l2;
use crate::v4l2::videodev::*;
use crate::{Capabilities, Format};

/// Owned file descriptor of an opened video4linux device node
///
/// The descriptor is closed exactly once, when the handle is dropped.
pub struct Handle {
    fd: std::os::raw::c_int,
    path: PathBuf,
}

impl Handle {
    /// Opens a device node for capturing
    ///
    /// The node is opened non-blocking: waiting is done explicitly through [`Driver::wait`], so
    /// a dequeue with nothing ready fails with `EAGAIN` instead of stalling.
    ///
    /// # Arguments
    ///
    /// * `path` - Path (e.g. "/dev/video0")
    ///
    /// # Example
    ///
    /// ```no_run
    /// use v4l_grab::device::Handle;
    /// let handle = Handle::open("/dev/video0");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = v4l2::open(path, libc::O_RDWR | libc::O_NONBLOCK)?;

        Ok(Handle {
            fd,
            path: PathBuf::from(path),
        })
    }

    /// Returns the raw file descriptor
    pub fn fd(&self) -> std::os::raw::c_int {
        self.fd
    }

    /// Returns the path this handle was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn buffer_desc(&self) -> v4l2_buffer {
        v4l2_buffer {
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..unsafe { mem::zeroed() }
        }
    }

    fn stream_ioctl(&self, request: v4l2::vidioc::_IOC_TYPE) -> io::Result<()> {
        let mut typ = V4L2_BUF_TYPE_VIDEO_CAPTURE as std::os::raw::c_int;
        unsafe {
            v4l2::ioctl(
                self.fd,
                request,
                &mut typ as *mut _ as *mut std::os::raw::c_void,
            )
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = v4l2::close(self.fd) {
            warn!(path = %self.path.display(), "failed to close device: {}", e);
        }
    }
}

unsafe impl Driver for Handle {
    fn query_caps(&self) -> io::Result<Capabilities> {
        unsafe {
            let mut v4l2_caps: v4l2_capability = mem::zeroed();
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_QUERYCAP,
                &mut v4l2_caps as *mut _ as *mut std::os::raw::c_void,
            )?;

            Ok(Capabilities::from(v4l2_caps))
        }
    }

    fn set_format(&self, fmt: &Format) -> io::Result<Format> {
        let mut v4l2_fmt: v4l2_format = unsafe { mem::zeroed() };
        v4l2_fmt.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        v4l2_fmt.fmt.pix = (*fmt).into();
        unsafe {
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_S_FMT,
                &mut v4l2_fmt as *mut _ as *mut std::os::raw::c_void,
            )?;

            // the driver wrote back what it actually applied
            Ok(Format::from(v4l2_fmt.fmt.pix))
        }
    }

    fn request_buffers(&self, count: u32) -> io::Result<u32> {
        let mut v4l2_reqbufs = v4l2_requestbuffers {
            count,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..unsafe { mem::zeroed() }
        };
        unsafe {
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_REQBUFS,
                &mut v4l2_reqbufs as *mut _ as *mut std::os::raw::c_void,
            )?;
        }

        Ok(v4l2_reqbufs.count)
    }

    fn query_buffer(&self, index: u32) -> io::Result<Description> {
        let mut v4l2_buf = v4l2_buffer {
            index,
            ..self.buffer_desc()
        };
        unsafe {
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_QUERYBUF,
                &mut v4l2_buf as *mut _ as *mut std::os::raw::c_void,
            )?;

            Ok(Description {
                index,
                length: v4l2_buf.length,
                offset: v4l2_buf.m.offset,
            })
        }
    }

    fn map(&self, desc: &Description) -> io::Result<NonNull<u8>> {
        let ptr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                desc.length as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                desc.offset as libc::off_t,
            )?
        };

        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned NULL"))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()> {
        v4l2::munmap(ptr.as_ptr() as *mut std::os::raw::c_void, length)
    }

    fn queue(&self, index: u32) -> io::Result<()> {
        let mut v4l2_buf = v4l2_buffer {
            index,
            ..self.buffer_desc()
        };
        unsafe {
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_QBUF,
                &mut v4l2_buf as *mut _ as *mut std::os::raw::c_void,
            )
        }
    }

    fn dequeue(&self) -> io::Result<Dequeued> {
        let mut v4l2_buf = self.buffer_desc();
        unsafe {
            v4l2::ioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_DQBUF,
                &mut v4l2_buf as *mut _ as *mut std::os::raw::c_void,
            )?;
        }

        Ok(Dequeued {
            index: v4l2_buf.index,
            meta: Metadata {
                bytesused: v4l2_buf.bytesused,
                flags: v4l2_buf.flags.into(),
                timestamp: v4l2_buf.timestamp.into(),
                sequence: v4l2_buf.sequence,
            },
        })
    }

    fn stream_on(&self) -> io::Result<()> {
        self.stream_ioctl(v4l2::vidioc::VIDIOC_STREAMON)
    }

    fn stream_off(&self) -> io::Result<()> {
        self.stream_ioctl(v4l2::vidioc::VIDIOC_STREAMOFF)
    }

    fn wait(&self, timeout: Duration) -> io::Result<Readiness> {
        match v4l2::poll(self.fd, libc::POLLIN, timeout)? {
            0 => Ok(Readiness::TimedOut),
            _ => Ok(Readiness::Ready),
        }
    }
}
