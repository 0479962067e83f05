//! ramftp - a single-file, in-memory FTP server engine.
//!
//! The engine serves exactly one virtual file backed by a caller-supplied
//! fixed-capacity buffer; there is no filesystem. It is poll-driven: the
//! host calls [`FtpServer::poll`] once per tick and receives each completed
//! transfer outcome exactly once. All socket and time access goes through
//! the [`channel::SocketProvider`] and [`clock::Clock`] capabilities, so
//! the whole protocol engine can be tested without real sockets.

pub mod auth;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod transfer;

pub use channel::tcp::TcpSocketProvider;
pub use clock::SystemClock;
pub use config::ServerConfig;
pub use server::FtpServer;
pub use transfer::TransferEvent;
