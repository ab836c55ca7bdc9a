//! Error types for the capture engine

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::Ownership;
use crate::device::State;

/// Result type alias using CaptureError
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Why the buffer pool could not be set up
#[derive(Debug, Error)]
pub enum AllocationError {
    /// VIDIOC_REQBUFS failed
    #[error("VIDIOC_REQBUFS for {count} buffers failed: {source}")]
    Request {
        count: u32,
        #[source]
        source: io::Error,
    },

    /// The driver granted fewer buffers than requested
    #[error("requested {requested} buffers, driver granted {granted}")]
    Insufficient { requested: u32, granted: u32 },

    /// VIDIOC_QUERYBUF failed
    #[error("VIDIOC_QUERYBUF for buffer {index} failed: {source}")]
    Query {
        index: u32,
        #[source]
        source: io::Error,
    },

    /// The buffer could not be mapped into our address space
    #[error("mmap of buffer {index} failed: {source}")]
    Map {
        index: u32,
        #[source]
        source: io::Error,
    },
}

/// Capture engine error types
///
/// Every driver call failure carries the name of the call, the buffer index where one applies
/// and the underlying OS error.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device node could not be opened or cannot stream video
    #[error("device {} unavailable: {source}", path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// VIDIOC_S_FMT failed
    #[error("format negotiation rejected: {0}")]
    ConfigurationRejected(#[source] io::Error),

    /// Buffer pool setup failed, no mappings are left behind
    #[error("buffer allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    /// Queueing the initial buffers or stream-on failed
    #[error("{call} failed while starting the stream: {source}")]
    StreamStart {
        call: &'static str,
        index: Option<u32>,
        #[source]
        source: io::Error,
    },

    /// An operation was called out of order
    #[error("cannot {operation} while the session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: State,
    },

    /// No frame became ready in time
    #[error("no frame ready within {timeout:?}")]
    AcquisitionTimeout { timeout: Duration },

    /// The wait primitive itself failed
    #[error("waiting for a frame failed: {0}")]
    AcquisitionWait(#[source] io::Error),

    /// VIDIOC_DQBUF failed
    #[error("VIDIOC_DQBUF failed: {0}")]
    Dequeue(#[source] io::Error),

    /// VIDIOC_QBUF failed when handing a buffer back, the buffer is retired
    #[error("VIDIOC_QBUF for buffer {index} failed: {source}")]
    Requeue {
        index: u32,
        #[source]
        source: io::Error,
    },

    /// Too many requeue failures in a row, or on the same buffer; the session cannot be
    /// trusted anymore
    #[error("requeue budget exhausted after {failures} failures, last on buffer {index}")]
    RequeueBudgetExhausted {
        index: u32,
        failures: u32,
        #[source]
        source: Option<io::Error>,
    },

    /// The driver refused every buffer back, nothing can ever become ready again
    #[error("all {retired} buffers were refused by the driver")]
    RingDrained { retired: usize },

    /// Ownership bookkeeping diverged from what the driver reports
    #[error("buffer {index} is {actual}-owned, expected {expected}-owned")]
    OwnershipViolation {
        index: u32,
        expected: Ownership,
        actual: Ownership,
    },

    /// The driver referred to a buffer outside the pool
    #[error("buffer index {index} outside of pool with {count} buffers")]
    InvalidIndex { index: u32, count: usize },

    /// The pool cannot be released while the driver still holds buffers
    #[error("{count} buffers are still owned by the driver")]
    BuffersInFlight { count: usize },

    /// A driver call failed during teardown
    #[error("{call} failed during teardown: {source}")]
    Teardown {
        call: &'static str,
        index: Option<u32>,
        #[source]
        source: io::Error,
    },
}

/// How the capture loop has to react to an error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// Skip the current frame and carry on with the same session
    Recoverable,
    /// Tear down the session and give up
    Fatal,
}

impl CaptureError {
    pub fn severity(&self) -> Severity {
        match self {
            CaptureError::AcquisitionTimeout { .. }
            | CaptureError::AcquisitionWait(_)
            | CaptureError::Dequeue(_)
            | CaptureError::Requeue { .. } => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_errors_are_recoverable() {
        let timeout = CaptureError::AcquisitionTimeout {
            timeout: Duration::from_secs(2),
        };
        assert!(!timeout.is_fatal());
        assert!(!CaptureError::Dequeue(io::Error::from_raw_os_error(libc::EAGAIN)).is_fatal());
        assert!(!CaptureError::Requeue {
            index: 1,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        }
        .is_fatal());
    }

    #[test]
    fn session_errors_are_fatal() {
        assert!(CaptureError::RequeueBudgetExhausted {
            index: 1,
            failures: 3,
            source: None,
        }
        .is_fatal());
        assert!(CaptureError::RingDrained { retired: 4 }.is_fatal());
        assert!(CaptureError::from(AllocationError::Insufficient {
            requested: 4,
            granted: 2
        })
        .is_fatal());
        assert!(CaptureError::ConfigurationRejected(io::Error::from_raw_os_error(libc::EINVAL))
            .is_fatal());
    }

    #[test]
    fn messages_name_the_call_and_index() {
        let err = CaptureError::Requeue {
            index: 2,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.to_string().starts_with("VIDIOC_QBUF for buffer 2 failed"));
    }
}
