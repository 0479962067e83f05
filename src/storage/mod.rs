//! Virtual file registry
//!
//! There is no filesystem: the server exposes exactly one file, backed by a
//! caller-supplied fixed-capacity buffer.

pub mod virtual_file;

pub use virtual_file::{FileEntry, VirtualFile};
