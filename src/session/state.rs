//! Session state
//!
//! Exactly one [`Session`] exists for the lifetime of the server. It is
//! reset, never reallocated, when a connection ends, so no state can leak
//! from one client to the next.

use std::net::SocketAddrV4;

use crate::protocol::line_reader::LineReader;

/// Control-connection lifecycle, in handshake order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Tear down whatever connection is left over.
    Disconnected,
    /// Reset the session, then wait for a client.
    AwaitClient,
    /// Listening; no client yet.
    Idle,
    /// Client greeted; expecting USER.
    AwaitUser,
    /// Username accepted; expecting PASS.
    AwaitPass,
    /// Logged in; running the command loop.
    Ready,
}

/// Data-transfer lifecycle. `Deleted` and `Renamed` are one-shot
/// notifications set synchronously by the dispatcher and surfaced to the
/// host on the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Retrieving,
    Storing,
    Deleted,
    Renamed,
}

/// All per-connection state: handshake progress, the line reader, transfer
/// mode bookkeeping and the three timers (inactivity/handshake deadline,
/// delay-before-retry gate; the transfer-start stamp lives in the transfer
/// engine).
pub struct Session {
    pub state: ConnectionState,
    pub transfer: TransferState,
    pub reader: LineReader,
    /// Current directory. Fixed at `/`; CWD reports success cosmetically.
    pub cwd: String,
    /// Set by an accepted RNFR, consumed by the next RNTO.
    pub rename_pending: bool,
    /// Cleared by PORT, set (back) by PASV.
    pub passive_mode: bool,
    /// Port reported in the 150 replies; PORT overwrites it.
    pub data_port: u16,
    /// Endpoint recorded by PORT. Never dialed: data connections are only
    /// ever accepted on the passive listener.
    pub remote_data_addr: Option<SocketAddrV4>,
    /// Handshake or inactivity deadline, monotonic ms.
    pub deadline_ms: u64,
    /// Polls are no-ops until this instant passes.
    pub delay_until_ms: u64,

    default_data_port: u16,
}

impl Session {
    pub fn new(max_command_length: usize, data_port: u16) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transfer: TransferState::Idle,
            reader: LineReader::new(max_command_length),
            cwd: "/".to_string(),
            rename_pending: false,
            passive_mode: true,
            data_port,
            remote_data_addr: None,
            deadline_ms: 0,
            delay_until_ms: 0,
            default_data_port: data_port,
        }
    }

    /// Restore all per-connection defaults. Called on every reconnection
    /// boundary; the connection state itself is advanced by the caller.
    pub fn reset(&mut self) {
        self.transfer = TransferState::Idle;
        self.reader.reset();
        self.cwd.clear();
        self.cwd.push('/');
        self.rename_pending = false;
        self.passive_mode = true;
        self.data_port = self.default_data_port;
        self.remote_data_addr = None;
        self.deadline_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn reset_restores_defaults() {
        let mut session = Session::new(64, 50009);
        session.cwd = "/elsewhere".into();
        session.rename_pending = true;
        session.passive_mode = false;
        session.data_port = 1234;
        session.remote_data_addr = Some(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1234));
        session.transfer = TransferState::Storing;
        session.deadline_ms = 99;

        session.reset();

        assert_eq!(session.cwd, "/");
        assert!(!session.rename_pending);
        assert!(session.passive_mode);
        assert_eq!(session.data_port, 50009);
        assert_eq!(session.remote_data_addr, None);
        assert_eq!(session.transfer, TransferState::Idle);
        assert_eq!(session.deadline_ms, 0);
    }

    #[test]
    fn connection_states_are_ordered() {
        assert!(ConnectionState::AwaitUser > ConnectionState::Idle);
        assert!(ConnectionState::Ready > ConnectionState::AwaitPass);
        assert!(ConnectionState::Disconnected < ConnectionState::AwaitClient);
    }
}
