//! The subset of `linux/videodev2.h` used for single-planar mmap capture.
//!
//! We carry our own copies of these structs instead of generating them with bindgen at build
//! time. Only the members we touch are named; everything else is kept as opaque padding so the
//! layout (and thus the size encoded into the ioctl request codes) matches the kernel ABI.
//!
//! Building with the `v4l2` feature checks every copy against the `v4l2-sys-mit` bindings of
//! the target's headers, so a layout mismatch fails the build instead of corrupting ioctls.
#![allow(non_camel_case_types)]

use std::os::raw::{c_ulong, c_void};

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_NONE: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

// The kernel union also contains `struct v4l2_window`, which holds pointers. The zero-sized
// pointer array reproduces its alignment.
#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_format__fmt {
    pub pix: v4l2_pix_format,
    pub raw_data: [u8; 200],
    _align: [*mut c_void; 0],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format__fmt,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_buffer__m {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer__m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

#[cfg(feature = "v4l2")]
mod layout {
    use std::mem::{align_of, offset_of, size_of};

    use super::*;

    macro_rules! assert_layout {
        ($name:ident { $($field:ident),* $(,)? }) => {
            const _: () = {
                assert!(size_of::<$name>() == size_of::<v4l2_sys::$name>());
                assert!(align_of::<$name>() == align_of::<v4l2_sys::$name>());
                $(assert!(offset_of!($name, $field) == offset_of!(v4l2_sys::$name, $field));)*
            };
        };
    }

    assert_layout!(v4l2_capability {
        driver,
        card,
        bus_info,
        version,
        capabilities,
        device_caps,
    });
    assert_layout!(v4l2_pix_format {
        width,
        height,
        pixelformat,
        field,
        bytesperline,
        sizeimage,
        colorspace,
        flags,
        quantization,
        xfer_func,
    });
    assert_layout!(v4l2_format { type_, fmt });
    assert_layout!(v4l2_requestbuffers {
        count,
        type_,
        memory,
        capabilities,
    });
    assert_layout!(v4l2_timecode {
        type_,
        flags,
        frames,
        seconds,
        minutes,
        hours,
        userbits,
    });
    assert_layout!(v4l2_buffer {
        index,
        type_,
        bytesused,
        flags,
        field,
        timestamp,
        timecode,
        sequence,
        memory,
        m,
        length,
        reserved2,
    });

    const _: () = {
        assert!(V4L2_BUF_TYPE_VIDEO_CAPTURE == v4l2_sys::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE);
        assert!(V4L2_MEMORY_MMAP == v4l2_sys::v4l2_memory_V4L2_MEMORY_MMAP);
        assert!(V4L2_FIELD_NONE == v4l2_sys::v4l2_field_V4L2_FIELD_NONE);
    };
}
