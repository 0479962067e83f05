//! Error types
//!
//! Domain-specific error types for each module of the server. Every
//! protocol-visible failure is reported to the client as a 3-digit control
//! response; these types carry the internal detail for logging and for the
//! host-facing API.

use std::fmt;

/// Authentication errors raised while validating USER/PASS.
#[derive(Debug)]
pub enum AuthError {
    InvalidUsername(String),
    InvalidPassword,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidUsername(u) => write!(f, "Invalid username: {}", u),
            AuthError::InvalidPassword => write!(f, "Invalid password"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Path resolution errors.
#[derive(Debug, PartialEq, Eq)]
pub enum PathError {
    /// The resolved path would not fit the configured path buffer.
    TooLong { len: usize, max: usize },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::TooLong { len, max } => {
                write!(f, "Resolved path is {} bytes, limit is {}", len, max)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Virtual file registry errors.
#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The file name exceeds the configured maximum.
    NameTooLong { len: usize, max: usize },
    /// A mount was requested with a size larger than the backing buffer.
    SizeExceedsCapacity { size: usize, capacity: usize },
    /// Appending would grow the file past the backing buffer.
    BufferOverflow {
        size: usize,
        incoming: usize,
        capacity: usize,
    },
    /// The operation requires a mounted file and none is present.
    Unmounted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NameTooLong { len, max } => {
                write!(f, "File name is {} bytes, limit is {}", len, max)
            }
            StorageError::SizeExceedsCapacity { size, capacity } => {
                write!(f, "File size {} exceeds buffer capacity {}", size, capacity)
            }
            StorageError::BufferOverflow {
                size,
                incoming,
                capacity,
            } => write!(
                f,
                "Appending {} bytes to {} would exceed buffer capacity {}",
                incoming, size, capacity
            ),
            StorageError::Unmounted => write!(f, "No file is mounted"),
        }
    }
}

impl std::error::Error for StorageError {}
