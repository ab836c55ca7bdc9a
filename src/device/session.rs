use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, io};

use tracing::{debug, error, info, warn};

use crate::buffer::Ownership;
use crate::device::{Driver, Handle};
use crate::error::{CaptureError, Result};
use crate::io::mmap::{Arena, Buffer};
use crate::{Capabilities, Format, FourCC};

/// Parameters fixed for the lifetime of a session
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of buffers in the ring
    pub buffer_count: u32,
    /// How long a single acquisition may wait for the driver
    pub timeout: Duration,
    /// Consecutive requeue failures after which the session is given up
    pub max_requeue_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            buffer_count: 4,
            timeout: Duration::from_secs(2),
            max_requeue_failures: 3,
        }
    }
}

/// Lifecycle of a [`Session`]
///
/// Transitions only ever go forward: Closed → Configured → Streaming → Stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Device is open, no format negotiated yet
    Closed,
    /// Format negotiated, no buffers yet
    Configured,
    /// Buffers are mapped and queued, the driver is producing frames
    Streaming,
    /// Streaming ended and all buffers are released
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "closed"),
            State::Configured => write!(f, "configured"),
            State::Streaming => write!(f, "streaming"),
            State::Stopped => write!(f, "stopped"),
        }
    }
}

/// One open, configured capture device
///
/// The session exclusively owns the device handle and the buffer pool. Frames are obtained
/// through [`Session::acquire`].
pub struct Session<D: Driver> {
    pub(crate) handle: Arc<D>,
    path: PathBuf,
    pub(crate) config: SessionConfig,
    caps: Capabilities,
    format: Option<Format>,
    pub(crate) state: State,
    pub(crate) arena: Option<Arena<D>>,
    pub(crate) requeue_failures: u32,
    pub(crate) failed_index: Option<u32>,
    /// Buffers the driver refused to take back, with the number of refusals each
    pub(crate) retired: BTreeMap<u32, u32>,
}

impl Session<Handle> {
    /// Opens a capture device by path
    ///
    /// Linux device nodes are usually found in /dev/videoX.
    ///
    /// # Arguments
    ///
    /// * `path` - Path (e.g. "/dev/video0")
    /// * `config` - Buffer count, timeout and requeue budget
    ///
    /// # Example
    ///
    /// ```no_run
    /// use v4l_grab::{FourCC, Session, SessionConfig};
    ///
    /// let mut session = Session::open("/dev/video0", SessionConfig::default())?;
    /// let format = session.configure(640, 480, FourCC::new(b"MJPG"))?;
    /// println!("negotiated {}", format);
    /// # Ok::<(), v4l_grab::CaptureError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, config: SessionConfig) -> Result<Self> {
        let path = path.as_ref();
        let handle = Handle::open(path).map_err(|source| CaptureError::DeviceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        Self::with_driver(handle, path, config)
    }
}

impl<D: Driver> Session<D> {
    /// Wraps an already opened driver
    ///
    /// The device has to support streaming video capture, otherwise `DeviceUnavailable` is
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `driver` - Opened device
    /// * `path` - Where the device lives, for diagnostics only
    /// * `config` - Buffer count, timeout and requeue budget
    pub fn with_driver<P: Into<PathBuf>>(
        driver: D,
        path: P,
        config: SessionConfig,
    ) -> Result<Self> {
        let path = path.into();
        let caps = match driver.query_caps() {
            Ok(caps) => caps,
            Err(source) => return Err(CaptureError::DeviceUnavailable { path, source }),
        };

        if !caps.can_stream_capture() {
            let source = io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "{} cannot stream video capture (capabilities: {})",
                    caps.card, caps.capabilities
                ),
            );
            return Err(CaptureError::DeviceUnavailable { path, source });
        }

        info!(
            path = %path.display(),
            driver = %caps.driver,
            card = %caps.card,
            "opened capture device"
        );

        Ok(Session {
            handle: Arc::new(driver),
            path,
            config,
            caps,
            format: None,
            state: State::Closed,
            arena: None,
            requeue_failures: 0,
            failed_index: None,
            retired: BTreeMap::new(),
        })
    }

    /// Returns the path this session was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the capabilities reported when the device was opened
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Returns the parameters the session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current lifecycle state
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the format the driver actually applied, once configured
    ///
    /// This may differ from what was asked for in [`Session::configure`]. Buffer sizes follow
    /// this format.
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Returns the underlying driver
    pub fn driver(&self) -> &D {
        &self.handle
    }

    /// Number of buffers in the pool, zero unless streaming
    pub fn buffer_count(&self) -> usize {
        self.arena.as_ref().map_or(0, Arena::len)
    }

    /// All buffers of the pool, empty unless streaming
    pub fn buffers(&self) -> &[Buffer] {
        self.arena.as_ref().map(Arena::buffers).unwrap_or_default()
    }

    /// Current owner of a buffer, if the pool has a buffer with that index
    pub fn ownership(&self, index: u32) -> Option<Ownership> {
        self.arena.as_ref()?.get(index).map(Buffer::owner)
    }

    /// Number of requeue failures since the last successful requeue
    pub fn consecutive_requeue_failures(&self) -> u32 {
        self.requeue_failures
    }

    /// Buffers the driver refused to take back and that are retried on the next acquisition
    pub fn retired_buffers(&self) -> Vec<u32> {
        self.retired.keys().copied().collect()
    }

    pub(crate) fn expect_state(&self, operation: &'static str, allowed: &[State]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CaptureError::InvalidSessionState {
                operation,
                state: self.state,
            })
        }
    }

    /// Negotiates the capture format
    ///
    /// Returns the format the driver settled on, which is also what [`Session::format`] reports
    /// from now on.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code
    pub fn configure(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<Format> {
        self.expect_state("configure", &[State::Closed])?;

        let requested = Format::new(width, height, fourcc);
        let negotiated = self
            .handle
            .set_format(&requested)
            .map_err(CaptureError::ConfigurationRejected)?;

        if (negotiated.width, negotiated.height, negotiated.fourcc)
            != (requested.width, requested.height, requested.fourcc)
        {
            warn!(
                requested = %requested,
                negotiated = %negotiated,
                "driver substituted a different format"
            );
        }
        info!(format = %negotiated, "format negotiated");

        self.format = Some(negotiated);
        self.state = State::Configured;
        Ok(negotiated)
    }

    /// Allocates the buffer pool, queues every buffer and starts streaming
    ///
    /// If any step fails, whatever was set up is torn down again before the error is returned
    /// and the session ends up stopped.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[State::Configured])?;

        let mut arena = match Arena::allocate(self.handle.clone(), self.config.buffer_count) {
            Ok(arena) => arena,
            Err(e) => {
                error!("buffer allocation failed: {}", e);
                self.state = State::Stopped;
                return Err(e.into());
            }
        };

        if let Err(e) = Self::prime(&self.handle, &mut arena) {
            error!("stream start failed: {}", e);
            if arena.count_owned_by(Ownership::Driver) > 0 {
                if let Err(off) = self.handle.stream_off() {
                    warn!("stream-off failed while aborting start: {}", off);
                }
                arena.reclaim_all();
            }
            if let Err(release) = arena.release() {
                warn!("releasing buffers failed while aborting start: {}", release);
            }
            self.state = State::Stopped;
            return Err(e);
        }

        info!(buffers = arena.len(), "streaming");
        self.arena = Some(arena);
        self.state = State::Streaming;
        Ok(())
    }

    fn prime(handle: &D, arena: &mut Arena<D>) -> Result<()> {
        for index in 0..arena.len() as u32 {
            handle
                .queue(index)
                .map_err(|source| CaptureError::StreamStart {
                    call: "VIDIOC_QBUF",
                    index: Some(index),
                    source,
                })?;
            arena.mark_queued(index)?;
        }

        handle
            .stream_on()
            .map_err(|source| CaptureError::StreamStart {
                call: "VIDIOC_STREAMON",
                index: None,
                source,
            })
    }

    /// Stops streaming and releases the buffer pool
    ///
    /// Stream-off returns every buffer to the application regardless of where it was, after
    /// which all regions are unmapped. Every step runs even if an earlier one failed; the first
    /// error is returned. Stopping a stopped session does nothing.
    pub fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", &[State::Streaming, State::Stopped])?;
        if self.state == State::Stopped {
            debug!("already stopped");
            return Ok(());
        }

        let mut result = Ok(());
        if let Err(source) = self.handle.stream_off() {
            error!("stream-off failed: {}", source);
            result = Err(CaptureError::Teardown {
                call: "VIDIOC_STREAMOFF",
                index: None,
                source,
            });
        }

        self.retired.clear();
        if let Some(mut arena) = self.arena.take() {
            arena.reclaim_all();
            if let Err(e) = arena.release() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.state = State::Stopped;
        info!("stopped");
        result
    }

    /// Stops the session if necessary and closes the device
    pub fn close(mut self) -> Result<()> {
        if self.state == State::Streaming {
            self.stop()
        } else {
            Ok(())
        }
    }
}

impl<D: Driver> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("format", &self.format)
            .field("buffers", &self.buffer_count())
            .field("requeue_failures", &self.requeue_failures)
            .field("retired", &self.retired)
            .finish()
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state == State::Streaming {
            if let Err(e) = self.stop() {
                warn!("failed to stop session: {}", e);
            }
        }
    }
}
