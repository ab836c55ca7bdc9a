use std::ptr::NonNull;
use std::slice;

use crate::buffer::{Metadata, Ownership};

/// Memory mapped buffer
///
/// The buffer is backed by camera device or kernel memory and shared with the driver. Read only
/// access is permitted while the application owns the buffer, i.e. between a dequeue and the
/// next queue of the same index.
#[derive(Debug)]
pub struct Buffer {
    index: u32,
    ptr: NonNull<u8>,
    length: usize,
    owner: Ownership,
    meta: Metadata,
}

impl Buffer {
    pub(crate) fn new(index: u32, ptr: NonNull<u8>, length: usize) -> Self {
        Buffer {
            index,
            ptr,
            length,
            // not queued yet
            owner: Ownership::Application,
            meta: Metadata::default(),
        }
    }

    /// Index within the driver's buffer ring
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Size of the backing memory region
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the backing memory region is empty
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Party currently holding the buffer
    pub fn owner(&self) -> Ownership {
        self.owner
    }

    /// Metadata of the most recent dequeue
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn set_owner(&mut self, owner: Ownership) {
        self.owner = owner;
    }

    pub(crate) fn set_meta(&mut self, meta: Metadata) {
        self.meta = meta;
    }

    /// The bytes the driver filled in, only while the application holds the buffer
    pub(crate) fn data(&self) -> Option<&[u8]> {
        if self.owner != Ownership::Application {
            return None;
        }

        let used = (self.meta.bytesused as usize).min(self.length);
        // The mapping stays valid until the arena unmaps it, which requires `&mut` access to the
        // arena and therefore cannot overlap with this borrow.
        Some(unsafe { slice::from_raw_parts(self.ptr.as_ptr(), used) })
    }
}
