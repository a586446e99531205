//! Storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "file")]
pub use file::FileSessionStore;
#[cfg(feature = "memory")]
pub use memory::MemorySessionStore;
