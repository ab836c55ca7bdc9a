use bitflags::bitflags;
use std::fmt;

use crate::Timestamp;

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Buffer is mapped
        const MAPPED                = 0x00000001;
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Image is a keyframe (I-frame)
        const KEYFRAME              = 0x00000008;
        /// Image is a P-frame
        const PFRAME                = 0x00000010;
        /// Image is a B-frame
        const BFRAME                = 0x00000020;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Timecode field is valid
        const TIMECODE              = 0x00000100;
        /// Buffer is prepared for queuing
        const PREPARED              = 0x00000400;
        /// Timestamp type
        const TIMESTAMP_MASK        = 0x0000e000;
        const TIMESTAMP_MONOTONIC   = 0x00002000;
        const TIMESTAMP_COPY        = 0x00004000;
        /// Timestamp sources
        const TSTAMP_SRC_MASK       = 0x00070000;
        const TSTAMP_SRC_SOE        = 0x00010000;
        /// mem2mem encoder/decoder
        const LAST                  = 0x00100000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Flags {
        Flags::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Buffer metadata, filled in by the driver on every dequeue
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Number of bytes occupied by the data in the buffer
    pub bytesused: u32,
    /// Buffer flags
    pub flags: Flags,
    /// Time of capture (usually set by the driver)
    pub timestamp: Timestamp,
    /// Sequence number, counting the frames
    pub sequence: u32,
}

/// The party currently allowed to touch a buffer's memory
///
/// Every mapped buffer is held by exactly one of the two at any point in time. The application
/// may only read the contents of a buffer it holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Queued to the driver, which may be writing into it right now
    Driver,
    /// Dequeued (or never queued), readable by the application
    Application,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Ownership::Driver => write!(f, "driver"),
            Ownership::Application => write!(f, "application"),
        }
    }
}

/// Driver-side description of a buffer as reported by VIDIOC_QUERYBUF
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Description {
    /// Index within the driver's buffer ring
    pub index: u32,
    /// Size of the backing memory region in bytes
    pub length: u32,
    /// Offset to pass to mmap
    pub offset: u32,
}

/// A filled buffer as handed out by VIDIOC_DQBUF
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dequeued {
    /// Index of the buffer the driver just returned
    pub index: u32,
    pub meta: Metadata,
}
