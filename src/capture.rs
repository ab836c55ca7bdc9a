//! Bounded still frame capture on top of a streaming [`Session`]

use std::io;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::codec;
use crate::device::{Driver, Session};
use crate::error::{CaptureError, Result};

/// Destination for captured frames
pub trait FrameSink {
    /// Stores the payload of frame `number` (1-based)
    ///
    /// `data` points into a buffer that goes back to the driver once this returns, so copy
    /// whatever has to be kept.
    fn persist(&mut self, number: u32, data: &[u8]) -> io::Result<()>;
}

/// How many frames to take and how
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    /// Number of acquisition attempts
    pub frames: u32,
    /// Pause after every captured frame but the last
    pub interval: Duration,
    /// Decode each frame before persisting it, failures are logged only
    pub decode: bool,
}

impl Default for CapturePlan {
    fn default() -> Self {
        CapturePlan {
            frames: 10,
            interval: Duration::from_millis(500),
            decode: false,
        }
    }
}

/// Outcome of a capture run that did not hit a fatal error
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    /// Frames handed to the sink successfully
    pub persisted: u32,
    pub timeouts: u32,
    pub wait_errors: u32,
    pub dequeue_errors: u32,
    /// Buffers the driver refused to take back, the frame itself was kept
    pub requeue_errors: u32,
    pub persist_failures: u32,
    pub decode_failures: u32,
    /// Frame numbers that did not end up in the sink
    pub skipped: Vec<u32>,
}

impl CaptureReport {
    fn record(&mut self, number: u32, err: &CaptureError) {
        match err {
            CaptureError::AcquisitionTimeout { .. } => self.timeouts += 1,
            CaptureError::AcquisitionWait(_) => self.wait_errors += 1,
            CaptureError::Dequeue(_) => self.dequeue_errors += 1,
            CaptureError::Requeue { .. } => {
                self.requeue_errors += 1;
                return;
            }
            _ => {}
        }
        self.skipped.push(number);
    }
}

/// Captures `plan.frames` frames from a streaming session into `sink`
///
/// Every attempt waits at most the session timeout. A frame that times out or fails to dequeue
/// is skipped and the run carries on; so does a frame the sink fails to store. Fatal errors end
/// the run and are returned, leaving the session for the caller to stop.
pub fn run<D, S>(
    session: &mut Session<D>,
    plan: &CapturePlan,
    sink: &mut S,
) -> Result<CaptureReport>
where
    D: Driver,
    S: FrameSink + ?Sized,
{
    let mut report = CaptureReport::default();

    for number in 1..=plan.frames {
        info!(number, total = plan.frames, "capturing frame");

        let frame = match session.acquire() {
            Ok(frame) => frame,
            Err(e) if !e.is_fatal() => {
                warn!(number, "frame skipped: {}", e);
                report.record(number, &e);
                continue;
            }
            Err(e) => {
                error!(number, "capture aborted: {}", e);
                return Err(e);
            }
        };

        if plan.decode {
            match codec::decode(frame.data()) {
                Ok(image) => {
                    info!(number, width = image.width, height = image.height, "frame decoded")
                }
                Err(e) => {
                    warn!(number, "frame does not decode: {}", e);
                    report.decode_failures += 1;
                }
            }
        }

        match sink.persist(number, frame.data()) {
            Ok(()) => {
                info!(number, len = frame.len(), "frame stored");
                report.persisted += 1;
            }
            Err(e) => {
                warn!(number, "failed to store frame: {}", e);
                report.persist_failures += 1;
                report.skipped.push(number);
            }
        }

        match frame.release() {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => report.record(number, &e),
            Err(e) => {
                error!(number, "capture aborted: {}", e);
                return Err(e);
            }
        }

        if number < plan.frames && !plan.interval.is_zero() {
            thread::sleep(plan.interval);
        }
    }

    info!(
        persisted = report.persisted,
        skipped = report.skipped.len(),
        "capture finished"
    );
    Ok(report)
}
