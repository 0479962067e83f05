//! Control and data channel management
//!
//! The engine performs all socket I/O through the [`Channel`] and
//! [`SocketProvider`] capability traits so the state machines can be driven
//! without real sockets. [`Channels`] owns the provider and the at most one
//! live control and one live data connection, and implements the bounded
//! cooperative wait for an inbound data connection.

pub mod tcp;

use std::io;
use std::net::Ipv4Addr;

use log::{debug, warn};

use crate::clock::Clock;

/// How long a command waits for the client to dial the data port.
pub const DATA_CONNECT_WAIT_MS: u64 = 10_000;

const ACCEPT_INITIAL_DELAY_MS: u64 = 100;
const ACCEPT_MAX_DELAY_MS: u64 = 800;

/// Result of a non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer.
    Data(usize),
    /// No data available right now; the peer is still connected.
    Pending,
    /// The peer closed the connection (or it failed).
    Closed,
}

/// Result of polling the control channel for a single byte.
#[derive(Debug, PartialEq, Eq)]
pub enum ByteRead {
    Byte(u8),
    Pending,
    Closed,
}

/// One non-blocking byte-stream connection.
pub trait Channel {
    /// Read up to `buf.len()` bytes without blocking.
    fn poll_read(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Write all bytes. Implementations may pause briefly on back-pressure
    /// but must give up within a bounded time.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn is_open(&self) -> bool;

    fn close(&mut self);
}

/// Listener pair feeding the engine with accepted connections.
pub trait SocketProvider {
    type Ctrl: Channel;
    type Data: Channel;

    /// Accept a pending control connection, if any.
    fn poll_control_client(&mut self) -> Option<Self::Ctrl>;

    /// Accept a pending data connection on the passive listener, if any.
    fn poll_data_client(&mut self) -> Option<Self::Data>;

    /// Local address advertised in the PASV reply.
    fn local_ip(&self) -> Ipv4Addr;
}

/// Owns the provider plus the single live control and data channels.
pub struct Channels<P: SocketProvider> {
    provider: P,
    control: Option<P::Ctrl>,
    data: Option<P::Data>,
}

impl<P: SocketProvider> Channels<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            control: None,
            data: None,
        }
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.provider.local_ip()
    }

    /// Adopt a newly pending control connection, force-closing the current
    /// one. Last writer wins; no goodbye is sent on this path.
    pub fn adopt_pending_control(&mut self) -> bool {
        if let Some(fresh) = self.provider.poll_control_client() {
            if let Some(mut old) = self.control.replace(fresh) {
                old.close();
                debug!("control connection preempted by a new client");
            }
            return true;
        }
        false
    }

    pub fn control_connected(&self) -> bool {
        self.control.as_ref().is_some_and(|c| c.is_open())
    }

    /// Poll the control channel for one byte.
    pub fn read_control_byte(&mut self) -> ByteRead {
        let Some(control) = self.control.as_mut() else {
            return ByteRead::Closed;
        };

        let mut byte = [0u8; 1];
        match control.poll_read(&mut byte) {
            ReadOutcome::Data(_) => ByteRead::Byte(byte[0]),
            ReadOutcome::Pending => ByteRead::Pending,
            ReadOutcome::Closed => ByteRead::Closed,
        }
    }

    /// Write one CRLF-terminated line to the control channel. Write
    /// failures mark the connection closed; the state machine notices on
    /// its next read.
    pub fn send_control_line(&mut self, line: &str) {
        debug!("(ctrl) {}", line);
        if let Some(control) = self.control.as_mut() {
            if let Err(e) = control.send(format!("{}\r\n", line).as_bytes()) {
                warn!("Control write failed: {}", e);
                control.close();
            }
        }
    }

    pub fn close_control(&mut self) {
        if let Some(mut control) = self.control.take() {
            control.close();
        }
    }

    /// Reuse the open data connection or wait for the client to dial the
    /// passive listener. The wait is cooperative: it polls the listener and
    /// sleeps with backoff through the clock, bounded by `wait_ms`.
    pub fn connect_data<C: Clock>(&mut self, clock: &C, wait_ms: u64) -> bool {
        if self.data.as_ref().is_some_and(|d| d.is_open()) {
            return true;
        }

        let deadline = clock.now_ms().saturating_add(wait_ms);
        let mut delay = ACCEPT_INITIAL_DELAY_MS;
        loop {
            if let Some(data) = self.provider.poll_data_client() {
                debug!("data connection accepted");
                self.data = Some(data);
                return true;
            }
            if clock.now_ms() >= deadline {
                warn!("Timed out waiting for a data connection");
                return false;
            }
            clock.sleep_ms(delay);
            delay = (delay * 2).min(ACCEPT_MAX_DELAY_MS);
        }
    }

    pub fn data_connected(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.is_open())
    }

    /// Read from the data channel into `buf`.
    pub fn read_data(&mut self, buf: &mut [u8]) -> ReadOutcome {
        match self.data.as_mut() {
            Some(data) => data.poll_read(buf),
            None => ReadOutcome::Closed,
        }
    }

    /// Write raw bytes to the data channel.
    pub fn send_data(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.data.as_mut() {
            Some(data) => data.send(bytes),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no data connection",
            )),
        }
    }

    /// Write one CRLF-terminated line to the data channel.
    pub fn send_data_line(&mut self, line: &str) -> io::Result<()> {
        debug!("(data) {}", line);
        self.send_data(format!("{}\r\n", line).as_bytes())
    }

    pub fn close_data(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.close();
        }
    }
}
