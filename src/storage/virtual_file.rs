//! Single-slot virtual file
//!
//! [`VirtualFile`] pairs a host-owned backing buffer with an optional mount
//! (name, size, modify-time). The buffer is allocated once and never grows;
//! every mutation is a checked operation that fails loudly instead of
//! truncating. The mount is replaced by a completed STOR, cleared by DELE
//! and relabeled by RNTO; the host mounts directly via [`VirtualFile::publish`].

use chrono::NaiveDateTime;

use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Mount {
    name: String,
    size: usize,
    modified: NaiveDateTime,
}

/// Read-only view of the mounted file, used by listings and SIZE/MDTM.
#[derive(Debug, Clone, Copy)]
pub struct FileEntry<'a> {
    pub name: &'a str,
    pub size: usize,
    pub modified: NaiveDateTime,
}

impl FileEntry<'_> {
    /// File name as shown in listings, without the leading slash.
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(self.name)
    }
}

pub struct VirtualFile {
    slot: Option<Mount>,
    buffer: Box<[u8]>,
    max_name_len: usize,
}

impl VirtualFile {
    /// Wrap a host-supplied buffer. The buffer length is the capacity for
    /// the lifetime of the registry.
    pub fn new(buffer: Box<[u8]>, max_name_len: usize) -> Self {
        Self {
            slot: None,
            buffer,
            max_name_len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_mounted(&self) -> bool {
        self.slot.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.slot.as_ref().map(|m| m.name.as_str())
    }

    pub fn size(&self) -> usize {
        self.slot.as_ref().map_or(0, |m| m.size)
    }

    /// The mounted byte range. Empty when nothing is mounted.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.size()]
    }

    /// Mutable access to the whole backing buffer, for the host to fill
    /// before publishing. Must not be used while a transfer is in flight.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn entry(&self) -> Option<FileEntry<'_>> {
        self.slot.as_ref().map(|m| FileEntry {
            name: &m.name,
            size: m.size,
            modified: m.modified,
        })
    }

    /// True when a file is mounted under exactly this resolved path.
    pub fn matches(&self, path: &str) -> bool {
        self.slot.as_ref().is_some_and(|m| m.name == path)
    }

    /// Host-facing mount: the current buffer contents become servable under
    /// `name` with the given size.
    pub fn publish(
        &mut self,
        name: &str,
        size: usize,
        now: NaiveDateTime,
    ) -> Result<(), StorageError> {
        self.check_name(name)?;
        if size > self.capacity() {
            return Err(StorageError::SizeExceedsCapacity {
                size,
                capacity: self.capacity(),
            });
        }

        self.slot = Some(Mount {
            name: name.to_string(),
            size,
            modified: now,
        });
        Ok(())
    }

    /// Mount-truncate for an incoming STOR: the slot is taken over by
    /// `name` with size zero, replacing whatever was mounted before.
    pub fn begin_store(&mut self, name: &str, now: NaiveDateTime) -> Result<(), StorageError> {
        self.check_name(name)?;
        self.slot = Some(Mount {
            name: name.to_string(),
            size: 0,
            modified: now,
        });
        Ok(())
    }

    /// Checked append during a store. The incoming bytes are only committed
    /// when they fit entirely.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let capacity = self.capacity();
        let mount = self.slot.as_mut().ok_or(StorageError::Unmounted)?;

        if mount.size + bytes.len() > capacity {
            return Err(StorageError::BufferOverflow {
                size: mount.size,
                incoming: bytes.len(),
                capacity,
            });
        }

        self.buffer[mount.size..mount.size + bytes.len()].copy_from_slice(bytes);
        mount.size += bytes.len();
        Ok(())
    }

    /// Stamp the modify-time, done when a store completes.
    pub fn stamp_modified(&mut self, now: NaiveDateTime) {
        if let Some(mount) = self.slot.as_mut() {
            mount.modified = now;
        }
    }

    /// Relabel the mount without touching buffer contents.
    pub fn rename(&mut self, name: &str) -> Result<(), StorageError> {
        self.check_name(name)?;
        let mount = self.slot.as_mut().ok_or(StorageError::Unmounted)?;
        mount.name = name.to_string();
        Ok(())
    }

    /// Unmount. Buffer contents are left as-is but are no longer servable.
    pub fn clear(&mut self) {
        self.slot = None;
    }

    fn check_name(&self, name: &str) -> Result<(), StorageError> {
        if name.len() > self.max_name_len {
            return Err(StorageError::NameTooLong {
                len: name.len(),
                max: self.max_name_len,
            });
        }
        Ok(())
    }
}
