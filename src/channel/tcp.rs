//! Non-blocking TCP implementation of the channel capabilities
//!
//! Binds the control listener and the fixed passive-data listener up front
//! and hands out non-blocking streams. The poll-driven engine never blocks
//! on a socket; writes pause briefly on back-pressure but give up within a
//! bounded time.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::channel::{Channel, ReadOutcome, SocketProvider};
use crate::config::ServerConfig;

const SEND_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A non-blocking TCP stream.
pub struct TcpChannel {
    stream: TcpStream,
    open: bool,
}

impl TcpChannel {
    fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { stream, open: true })
    }
}

impl Channel for TcpChannel {
    fn poll_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if !self.open {
            return ReadOutcome::Closed;
        }

        match self.stream.read(buf) {
            Ok(0) => {
                self.open = false;
                ReadOutcome::Closed
            }
            Ok(n) => ReadOutcome::Data(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Pending,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => ReadOutcome::Pending,
            Err(e) => {
                warn!("Socket read failed: {}", e);
                self.open = false;
                ReadOutcome::Closed
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed"));
        }

        let start = Instant::now();
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    self.open = false;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting bytes",
                    ));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() > SEND_STALL_TIMEOUT {
                        self.open = false;
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "write stalled on back-pressure",
                        ));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.open = false;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
            self.open = false;
        }
    }
}

/// Listener pair bound to the configured control and data ports.
pub struct TcpSocketProvider {
    control_listener: TcpListener,
    data_listener: TcpListener,
    local_ip: Ipv4Addr,
}

impl TcpSocketProvider {
    /// Bind both listeners in non-blocking mode.
    pub fn bind(config: &ServerConfig) -> io::Result<Self> {
        let control_listener = Self::bind_one(&config.bind_address, config.control_port)?;
        let data_listener = Self::bind_one(&config.bind_address, config.data_port)?;

        // Advertised in PASV replies until the first accepted connection
        // reveals the address the client actually reached us on.
        let local_ip = match control_listener.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => ip,
            _ => Ipv4Addr::LOCALHOST,
        };

        info!(
            "Listening on {}:{} (data port {})",
            config.bind_address, config.control_port, config.data_port
        );

        Ok(Self {
            control_listener,
            data_listener,
            local_ip,
        })
    }

    fn bind_one(address: &str, port: u16) -> io::Result<TcpListener> {
        let listener = TcpListener::bind((address, port)).map_err(|e| {
            error!("Failed to bind to {}:{}: {}", address, port, e);
            e
        })?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    fn poll_accept(listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
        match listener.accept() {
            Ok(accepted) => Some(accepted),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                error!("Error accepting connection: {}", e);
                None
            }
        }
    }
}

impl SocketProvider for TcpSocketProvider {
    type Ctrl = TcpChannel;
    type Data = TcpChannel;

    fn poll_control_client(&mut self) -> Option<TcpChannel> {
        let (stream, peer) = Self::poll_accept(&self.control_listener)?;
        info!("Client connected: {}", peer);

        if let Ok(SocketAddr::V4(local)) = stream.local_addr() {
            self.local_ip = *local.ip();
        }

        match TcpChannel::new(stream) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!("Failed to configure control stream: {}", e);
                None
            }
        }
    }

    fn poll_data_client(&mut self) -> Option<TcpChannel> {
        let (stream, peer) = Self::poll_accept(&self.data_listener)?;
        info!("Data connection from {}", peer);

        match TcpChannel::new(stream) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!("Failed to configure data stream: {}", e);
                None
            }
        }
    }

    fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }
}
