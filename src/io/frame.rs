use std::ops::Deref;
use std::{fmt, io};

use tracing::{debug, error, info, warn};

use crate::buffer::{Metadata, Ownership};
use crate::device::{Driver, Readiness, Session, State};
use crate::error::{CaptureError, Result};
use crate::io::mmap::Arena;

impl<D: Driver> Session<D> {
    /// Waits for the next filled buffer and hands it out as a [`Frame`]
    ///
    /// The frame borrows the session mutably, so there is at most one frame outstanding at any
    /// time. Dropping the frame (or calling [`Frame::release`]) queues the buffer again.
    ///
    /// A timeout, a failing wait or a failing dequeue leave every buffer where it was; the next
    /// call simply tries again. Buffers the driver refused earlier are offered to it again
    /// first. Once the driver holds none of the buffers anymore, `RingDrained` is returned.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use v4l_grab::{FourCC, Session, SessionConfig};
    ///
    /// let mut session = Session::open("/dev/video0", SessionConfig::default())?;
    /// session.configure(640, 480, FourCC::new(b"MJPG"))?;
    /// session.start()?;
    ///
    /// let frame = session.acquire()?;
    /// println!("frame {} with {} bytes", frame.meta().sequence, frame.len());
    /// frame.release()?;
    ///
    /// session.stop()?;
    /// # Ok::<(), v4l_grab::CaptureError>(())
    /// ```
    pub fn acquire(&mut self) -> Result<Frame<'_, D>> {
        self.expect_state("acquire", &[State::Streaming])?;

        if let Some((index, failures)) = self.exhausted_budget() {
            return Err(CaptureError::RequeueBudgetExhausted {
                index,
                failures,
                source: None,
            });
        }

        self.recover_retired()?;
        let retired = self.retired.len();
        let held = self
            .arena_mut("acquire")?
            .count_owned_by(Ownership::Driver)
            .saturating_sub(retired);
        if held == 0 {
            error!(retired, "driver holds no usable buffers");
            return Err(CaptureError::RingDrained { retired });
        }

        let timeout = self.config.timeout;
        match self.handle.wait(timeout) {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::TimedOut) => {
                debug!(?timeout, "no frame ready");
                return Err(CaptureError::AcquisitionTimeout { timeout });
            }
            Err(e) => return Err(CaptureError::AcquisitionWait(e)),
        }

        let dequeued = self.handle.dequeue().map_err(CaptureError::Dequeue)?;
        let arena = self.arena_mut("acquire")?;
        arena.mark_dequeued(dequeued.index, dequeued.meta)?;

        debug!(
            index = dequeued.index,
            sequence = dequeued.meta.sequence,
            bytesused = dequeued.meta.bytesused,
            "dequeued buffer"
        );

        Ok(Frame {
            session: self,
            index: dequeued.index,
            meta: dequeued.meta,
            released: false,
        })
    }

    /// Hands an application owned buffer back to the driver
    ///
    /// If the driver refuses, the buffer is retired: it counts as driver owned and is never
    /// read, but every following acquisition offers it to the driver again. Too many refusals
    /// in a row, or too many for the same buffer, exhaust the requeue budget, after which the
    /// session refuses to hand out further frames.
    pub(crate) fn requeue(&mut self, index: u32) -> Result<()> {
        match self.handle.queue(index) {
            Ok(()) => {
                self.arena_mut("requeue")?.mark_queued(index)?;
                self.requeue_failures = 0;
                Ok(())
            }
            Err(source) => {
                self.arena_mut("requeue")?.retire(index)?;
                Err(self.requeue_failed(index, source))
            }
        }
    }

    // Offers every retired buffer to the driver again. Only an exhausted budget is an error,
    // a buffer that is refused once more simply stays retired.
    fn recover_retired(&mut self) -> Result<()> {
        let retired: Vec<u32> = self.retired.keys().copied().collect();
        for index in retired {
            match self.handle.queue(index) {
                Ok(()) => {
                    self.retired.remove(&index);
                    self.requeue_failures = 0;
                    info!(index, "retired buffer accepted by the driver again");
                }
                Err(source) => {
                    let err = self.requeue_failed(index, source);
                    if err.is_fatal() {
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn requeue_failed(&mut self, index: u32, source: io::Error) -> CaptureError {
        self.requeue_failures += 1;
        self.failed_index = Some(index);
        let refusals = self.retired.entry(index).or_insert(0);
        *refusals += 1;
        let refusals = *refusals;

        let max = self.config.max_requeue_failures;
        if self.requeue_failures >= max || refusals >= max {
            let failures = self.requeue_failures.max(refusals);
            error!(index, failures, "requeue budget exhausted: {}", source);
            CaptureError::RequeueBudgetExhausted {
                index,
                failures,
                source: Some(source),
            }
        } else {
            warn!(index, refusals, "requeue failed, buffer retired: {}", source);
            CaptureError::Requeue { index, source }
        }
    }

    fn exhausted_budget(&self) -> Option<(u32, u32)> {
        let max = self.config.max_requeue_failures;
        if self.requeue_failures >= max {
            return Some((self.last_failed_index(), self.requeue_failures));
        }
        self.retired
            .iter()
            .find(|&(_, &refusals)| refusals >= max)
            .map(|(&index, &refusals)| (index, refusals))
    }

    fn arena_mut(&mut self, operation: &'static str) -> Result<&mut Arena<D>> {
        let state = self.state;
        self.arena
            .as_mut()
            .ok_or(CaptureError::InvalidSessionState { operation, state })
    }

    fn last_failed_index(&self) -> u32 {
        self.failed_index.unwrap_or_default()
    }
}

/// A filled buffer on loan from the driver
///
/// Derefs to the bytes the driver wrote, `bytesused` of them. The memory is shared with the
/// driver and must not outlive this guard, so copy it if you need to keep it.
pub struct Frame<'a, D: Driver> {
    session: &'a mut Session<D>,
    index: u32,
    meta: Metadata,
    released: bool,
}

impl<'a, D: Driver> Frame<'a, D> {
    /// Index of the underlying buffer
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Metadata the driver reported with this frame
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// The payload
    pub fn data(&self) -> &[u8] {
        self.session
            .arena
            .as_ref()
            .and_then(|arena| arena.data(self.index))
            .unwrap_or_default()
    }

    /// Returns the buffer to the driver
    ///
    /// Same as dropping the frame, but reports whether the driver accepted the buffer.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.session.requeue(self.index)
    }
}

impl<'a, D: Driver> Deref for Frame<'a, D> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl<'a, D: Driver> fmt::Debug for Frame<'a, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("meta", &self.meta)
            .field("len", &self.data().len())
            .finish()
    }
}

impl<'a, D: Driver> Drop for Frame<'a, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        self.released = true;
        if let Err(e) = self.session.requeue(self.index) {
            warn!("failed to requeue buffer {}: {}", self.index, e);
        }
    }
}
