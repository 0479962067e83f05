//! Store/retrieve stepping
//!
//! [`TransferEngine`] owns the fixed scratch buffer and the per-transfer
//! accounting (start time, byte count). The connection state machine arms a
//! transfer through the dispatcher and then calls one step per poll until
//! the engine reports completion.

use log::{debug, info, warn};

use crate::channel::{Channels, ReadOutcome, SocketProvider};
use crate::clock::Clock;
use crate::session::{Session, TransferState};
use crate::storage::VirtualFile;

/// Result of one transfer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Transfer still in flight; step again next poll.
    Continue,
    /// Transfer finished normally.
    Done,
    /// Transfer failed and was torn down; no host event.
    Aborted,
}

pub struct TransferEngine {
    scratch: Vec<u8>,
    began_ms: u64,
    bytes: u64,
}

impl TransferEngine {
    pub fn new(scratch_size: usize) -> Self {
        Self {
            scratch: vec![0u8; scratch_size],
            began_ms: 0,
            bytes: 0,
        }
    }

    /// Arm the accounting for a transfer that is about to start.
    pub fn begin(&mut self, now_ms: u64) {
        self.began_ms = now_ms;
        self.bytes = 0;
    }

    /// Send the whole mounted region to the data channel in one shot.
    /// Retrieval is never chunked across polls.
    pub fn step_retrieve<P: SocketProvider>(
        &mut self,
        file: &VirtualFile,
        channels: &mut Channels<P>,
        now_ms: u64,
    ) -> StepOutcome {
        debug!("Sending {} mounted bytes", file.size());

        if let Err(e) = channels.send_data(file.data()) {
            warn!("Data write failed during retrieve: {}", e);
            channels.close_data();
            channels.send_control_line("426 Transfer aborted");
            return StepOutcome::Aborted;
        }

        self.bytes += file.size() as u64;
        self.finish(channels, now_ms);
        StepOutcome::Done
    }

    /// Read up to one scratch buffer of bytes and append them to the mount.
    /// The peer closing the data channel completes the store; growing past
    /// the buffer capacity aborts it and clears the mount entirely.
    pub fn step_store<P: SocketProvider, C: Clock>(
        &mut self,
        file: &mut VirtualFile,
        channels: &mut Channels<P>,
        clock: &C,
    ) -> StepOutcome {
        match channels.read_data(&mut self.scratch) {
            ReadOutcome::Data(n) => {
                if let Err(e) = file.append(&self.scratch[..n]) {
                    warn!("File buffer overflow: {}", e);
                    channels.close_data();
                    channels.send_control_line("426 Transfer aborted");
                    // A partially received file must not stay servable.
                    file.clear();
                    return StepOutcome::Aborted;
                }
                self.bytes += n as u64;
                StepOutcome::Continue
            }
            ReadOutcome::Pending => StepOutcome::Continue,
            ReadOutcome::Closed => {
                file.stamp_modified(clock.wall_time());
                self.finish(channels, clock.now_ms());
                StepOutcome::Done
            }
        }
    }

    /// Report elapsed time and throughput, then drop the data channel. The
    /// rate line is omitted when elapsed time or byte count is zero.
    fn finish<P: SocketProvider>(&mut self, channels: &mut Channels<P>, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.began_ms);
        if elapsed_ms > 0 && self.bytes > 0 {
            channels.send_control_line("226-File successfully transferred");
            channels.send_control_line(&format!(
                "226 {} ms, {} kbytes/s",
                elapsed_ms,
                self.bytes / elapsed_ms
            ));
        } else {
            channels.send_control_line("226 File successfully transferred");
        }

        info!("Transfer complete: {} bytes in {} ms", self.bytes, elapsed_ms);
        channels.close_data();
    }
}

/// Force-close the data channel and reset the transfer state. A transfer
/// that was actually moving bytes is reported aborted on the control
/// channel.
pub fn abort_transfer<P: SocketProvider>(session: &mut Session, channels: &mut Channels<P>) {
    if matches!(
        session.transfer,
        TransferState::Retrieving | TransferState::Storing
    ) {
        channels.send_control_line("426 Transfer aborted");
        info!("Transfer aborted");
    }

    channels.close_data();
    session.transfer = TransferState::Idle;
}
