pub mod arena;
pub use arena::Arena;

pub mod buffer;
pub use buffer::Buffer;
