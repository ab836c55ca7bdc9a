//! Still frame capture from memory-mapped video4linux devices
//!
//! The core is a small buffer-ring engine: a [`Session`] negotiates a format, maps a fixed pool
//! of driver buffers and hands out one [`Frame`] at a time while tracking which party owns each
//! buffer. [`capture::run`] drives a bounded capture on top of it.
//!
//! ```no_run
//! use v4l_grab::capture::{self, CapturePlan};
//! use v4l_grab::storage::FileSink;
//! use v4l_grab::{FourCC, Session, SessionConfig};
//!
//! let mut session = Session::open("/dev/video0", SessionConfig::default())?;
//! session.configure(640, 480, FourCC::MJPG)?;
//! session.start()?;
//!
//! let mut sink = FileSink::new(".", "image_{n}.jpg");
//! let report = capture::run(&mut session, &CapturePlan::default(), &mut sink)?;
//! println!("{} frames written", report.persisted);
//!
//! session.stop()?;
//! # Ok::<(), v4l_grab::CaptureError>(())
//! ```

pub mod v4l2;

pub mod buffer;

pub mod capability;
pub use capability::Capabilities;

pub mod device;
pub use device::{Driver, Handle, Readiness, Session, SessionConfig, State};

pub mod error;
pub use error::{AllocationError, CaptureError, Severity};

mod fourcc;
pub use fourcc::FourCC;

mod format;
pub use format::Format;

pub mod io;
pub use io::Frame;

mod timestamp;
pub use timestamp::Timestamp;

pub mod capture;
pub mod codec;
pub mod config;
pub mod storage;
