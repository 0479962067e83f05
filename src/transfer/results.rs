//! Host-facing transfer notifications

/// Outcome reported by one `poll()`. Each terminal outcome is returned
/// exactly once; `Idle` means nothing completed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    Idle,
    /// A client downloaded the mounted file.
    Retrieved,
    /// A client upload completed and replaced the mount.
    Stored,
    /// DELE cleared the mount.
    Deleted,
    /// RNTO relabeled the mount.
    Renamed,
}
