//! Session management
//!
//! One session value, reused across connections, with an explicit reset on
//! every reconnection boundary.

pub mod state;

pub use state::{ConnectionState, Session, TransferState};
