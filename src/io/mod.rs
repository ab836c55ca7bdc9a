pub mod mmap;

pub mod frame;
pub use frame::Frame;
