//! Data transfer engine
//!
//! Drives one in-flight store or retrieve against the virtual file and the
//! data channel, and defines the host-facing transfer notifications.

pub mod engine;
pub mod results;

pub use engine::{abort_transfer, StepOutcome, TransferEngine};
pub use results::TransferEvent;
