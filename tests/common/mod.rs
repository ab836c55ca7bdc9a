#![allow(dead_code)]

use std::cell::{RefCell, RefMut};
use std::collections::VecDeque;
use std::io;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use v4l_grab::buffer::{Dequeued, Description, Metadata};
use v4l_grab::capability::Flags;
use v4l_grab::{Capabilities, Driver, Format, FourCC, Readiness, Session, SessionConfig};

/// Scripted outcome of a single wait
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Wait {
    Ready,
    TimedOut,
    Fail(i32),
}

/// Everything the fake driver knows and records
#[derive(Debug)]
pub struct FakeState {
    pub caps: Capabilities,
    pub fail_querycap: bool,
    pub reject_format: bool,
    /// Format reported back instead of the requested one
    pub substitute: Option<Format>,
    pub buffer_len: u32,
    /// Buffers granted by REQBUFS instead of the requested count
    pub grant: Option<u32>,
    pub fail_query_at: Option<u32>,
    pub fail_map_at: Option<u32>,
    pub fail_queue_index: Option<u32>,
    /// Number of upcoming QBUF calls that fail
    pub fail_next_queues: u32,
    pub fail_next_dequeues: u32,
    /// Index reported by the next dequeue instead of the true one
    pub bogus_dequeue_index: Option<u32>,
    pub fail_stream_on: bool,
    pub fail_stream_off: bool,
    pub waits: VecDeque<Wait>,

    pub streaming: bool,
    /// Buffers the driver currently holds, in the order they were queued
    pub incoming: VecDeque<u32>,
    pub regions: Vec<Option<(NonNull<u8>, usize)>>,
    pub sequence: u32,

    pub calls: Vec<&'static str>,
    pub queued: Vec<u32>,
    pub dequeued: Vec<u32>,
    pub unmapped: Vec<u32>,
    pub request_counts: Vec<u32>,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            caps: Capabilities {
                driver: "fake".to_string(),
                card: "Fake Camera".to_string(),
                bus: "platform:fake".to_string(),
                version: (6, 1, 0),
                capabilities: Flags::VIDEO_CAPTURE | Flags::STREAMING,
            },
            fail_querycap: false,
            reject_format: false,
            substitute: None,
            buffer_len: 4096,
            grant: None,
            fail_query_at: None,
            fail_map_at: None,
            fail_queue_index: None,
            fail_next_queues: 0,
            fail_next_dequeues: 0,
            bogus_dequeue_index: None,
            fail_stream_on: false,
            fail_stream_off: false,
            waits: VecDeque::new(),
            streaming: false,
            incoming: VecDeque::new(),
            regions: Vec::new(),
            sequence: 0,
            calls: Vec::new(),
            queued: Vec::new(),
            dequeued: Vec::new(),
            unmapped: Vec::new(),
            request_counts: Vec::new(),
        }
    }
}

impl FakeState {
    /// Number of regions currently mapped
    pub fn mapped(&self) -> usize {
        self.regions.iter().filter(|r| r.is_some()).count()
    }

    fn payload_len(&self) -> usize {
        (self.buffer_len / 2) as usize
    }
}

/// In-memory stand-in for a capture device
///
/// Clones share their state, so a test keeps one clone to script and inspect the driver while
/// the session owns the other.
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Rc<RefCell<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    fn log(&self, call: &'static str) -> RefMut<'_, FakeState> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        state
    }
}

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

unsafe impl Driver for FakeDriver {
    fn query_caps(&self) -> io::Result<Capabilities> {
        let state = self.log("VIDIOC_QUERYCAP");
        if state.fail_querycap {
            return Err(os_error(libc::ENOTTY));
        }
        Ok(state.caps.clone())
    }

    fn set_format(&self, fmt: &Format) -> io::Result<Format> {
        let state = self.log("VIDIOC_S_FMT");
        if state.reject_format {
            return Err(os_error(libc::EINVAL));
        }
        Ok(state.substitute.unwrap_or(Format {
            size: state.buffer_len,
            ..*fmt
        }))
    }

    fn request_buffers(&self, count: u32) -> io::Result<u32> {
        let mut state = self.log("VIDIOC_REQBUFS");
        state.request_counts.push(count);
        if count == 0 {
            return Ok(0);
        }
        Ok(state.grant.unwrap_or(count))
    }

    fn query_buffer(&self, index: u32) -> io::Result<Description> {
        let state = self.log("VIDIOC_QUERYBUF");
        if state.fail_query_at == Some(index) {
            return Err(os_error(libc::EINVAL));
        }
        Ok(Description {
            index,
            length: state.buffer_len,
            offset: index * state.buffer_len,
        })
    }

    fn map(&self, desc: &Description) -> io::Result<NonNull<u8>> {
        let mut state = self.log("mmap");
        if state.fail_map_at == Some(desc.index) {
            return Err(os_error(libc::ENOMEM));
        }

        let region: Box<[u8]> = vec![0u8; desc.length as usize].into_boxed_slice();
        let len = region.len();
        let ptr = NonNull::new(Box::into_raw(region) as *mut u8)
            .ok_or_else(|| os_error(libc::ENOMEM))?;

        let index = desc.index as usize;
        if state.regions.len() <= index {
            state.regions.resize(index + 1, None);
        }
        state.regions[index] = Some((ptr, len));
        Ok(ptr)
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()> {
        let mut state = self.log("munmap");
        let index = state
            .regions
            .iter()
            .position(|r| matches!(r, Some((p, _)) if *p == ptr))
            .ok_or_else(|| os_error(libc::EINVAL))?;

        let (ptr, len) = state.regions[index].take().ok_or_else(|| os_error(libc::EINVAL))?;
        assert_eq!(len, length, "unmapped with a different length");
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            ptr.as_ptr(),
            len,
        )));
        state.unmapped.push(index as u32);
        Ok(())
    }

    fn queue(&self, index: u32) -> io::Result<()> {
        let mut state = self.log("VIDIOC_QBUF");
        if state.fail_queue_index == Some(index) {
            return Err(os_error(libc::EINVAL));
        }
        if state.fail_next_queues > 0 {
            state.fail_next_queues -= 1;
            return Err(os_error(libc::EIO));
        }
        if state.incoming.contains(&index) {
            return Err(os_error(libc::EBUSY));
        }
        state.incoming.push_back(index);
        state.queued.push(index);
        Ok(())
    }

    fn dequeue(&self) -> io::Result<Dequeued> {
        let mut state = self.log("VIDIOC_DQBUF");
        if state.fail_next_dequeues > 0 {
            state.fail_next_dequeues -= 1;
            return Err(os_error(libc::EIO));
        }
        if !state.streaming {
            return Err(os_error(libc::EINVAL));
        }
        let index = state.incoming.pop_front().ok_or_else(|| os_error(libc::EAGAIN))?;

        // fill the frame, the first byte carries the sequence number
        let sequence = state.sequence;
        state.sequence += 1;
        let used = state.payload_len();
        if let Some((ptr, len)) = state.regions[index as usize] {
            let used = used.min(len);
            unsafe {
                std::ptr::write_bytes(ptr.as_ptr(), 0xab, used);
                *ptr.as_ptr() = sequence as u8;
            }
        }

        state.dequeued.push(index);
        let reported = state.bogus_dequeue_index.take().unwrap_or(index);
        Ok(Dequeued {
            index: reported,
            meta: Metadata {
                bytesused: used as u32,
                sequence,
                ..Metadata::default()
            },
        })
    }

    fn stream_on(&self) -> io::Result<()> {
        let mut state = self.log("VIDIOC_STREAMON");
        if state.fail_stream_on {
            return Err(os_error(libc::EIO));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self) -> io::Result<()> {
        let mut state = self.log("VIDIOC_STREAMOFF");
        // the driver drops its queue either way
        state.streaming = false;
        state.incoming.clear();
        if state.fail_stream_off {
            return Err(os_error(libc::EIO));
        }
        Ok(())
    }

    fn wait(&self, _timeout: Duration) -> io::Result<Readiness> {
        let mut state = self.log("poll");
        match state.waits.pop_front() {
            Some(Wait::Ready) => Ok(Readiness::Ready),
            Some(Wait::TimedOut) => Ok(Readiness::TimedOut),
            Some(Wait::Fail(code)) => Err(os_error(code)),
            None if state.streaming && !state.incoming.is_empty() => Ok(Readiness::Ready),
            None => Ok(Readiness::TimedOut),
        }
    }
}

pub const PATH: &str = "/dev/video-fake";

pub fn config(buffer_count: u32) -> SessionConfig {
    SessionConfig {
        buffer_count,
        timeout: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

/// Opens a session on `fake`, still closed
pub fn open(fake: &FakeDriver, buffer_count: u32) -> Session<FakeDriver> {
    Session::with_driver(fake.clone(), PATH, config(buffer_count)).expect("open")
}

/// Opens, configures and starts a session on `fake`
pub fn streaming(fake: &FakeDriver, buffer_count: u32) -> Session<FakeDriver> {
    streaming_with(fake, config(buffer_count))
}

pub fn streaming_with(fake: &FakeDriver, config: SessionConfig) -> Session<FakeDriver> {
    let mut session = Session::with_driver(fake.clone(), PATH, config).expect("open");
    session
        .configure(640, 480, FourCC::MJPG)
        .expect("configure");
    session.start().expect("start");
    session
}
