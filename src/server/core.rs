//! Connection state machine
//!
//! [`FtpServer`] is the poll-driven engine: the host calls [`FtpServer::poll`]
//! once per tick and the engine advances the control-connection handshake,
//! feeds completed command lines to the dispatcher and steps any in-flight
//! data transfer. All I/O goes through the injected [`SocketProvider`] and
//! [`Clock`] capabilities; nothing here blocks beyond the bounded
//! data-connection wait.

use log::{debug, info, warn};

use crate::auth::{validate_password, validate_user, Credentials};
use crate::channel::{ByteRead, Channels, SocketProvider};
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::{PathError, StorageError};
use crate::protocol::handlers::CommandContext;
use crate::protocol::resolver::resolve_path;
use crate::protocol::{handle_command, parse_command, CommandStatus, LineOutcome};
use crate::session::{ConnectionState, Session, TransferState};
use crate::storage::VirtualFile;
use crate::transfer::{abort_transfer, StepOutcome, TransferEngine, TransferEvent};

/// How long a freshly connected client gets to start the login handshake.
const HANDSHAKE_WAIT_MS: u64 = 10_000;
/// Pause before accepting a reconnection after a failed login.
const AUTH_RETRY_DELAY_MS: u64 = 100;
/// Pause before accepting a reconnection after an inactivity timeout.
const TIMEOUT_RETRY_DELAY_MS: u64 = 200;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Single-session FTP engine over one virtual file.
pub struct FtpServer<P: SocketProvider, C: Clock> {
    config: ServerConfig,
    credentials: Credentials,
    clock: C,
    channels: Channels<P>,
    session: Session,
    transfer: TransferEngine,
    file: VirtualFile,
}

impl<P: SocketProvider, C: Clock> FtpServer<P, C> {
    /// Build the engine around a host-supplied backing buffer. The buffer
    /// length is the virtual file capacity for the lifetime of the server.
    pub fn new(provider: P, clock: C, config: ServerConfig, buffer: Box<[u8]>) -> Self {
        let credentials = Credentials::from_config(&config);
        let session = Session::new(config.max_command_length, config.data_port);
        let transfer = TransferEngine::new(config.scratch_buffer_size);
        let file = VirtualFile::new(buffer, config.max_filename_length);

        Self {
            config,
            credentials,
            clock,
            channels: Channels::new(provider),
            session,
            transfer,
            file,
        }
    }

    /// Mount the current buffer contents under `name` with the given size,
    /// stamping the modify-time to now. May be called at any time, even
    /// mid-session. The name is resolved against the root so that it
    /// matches client-supplied paths.
    pub fn publish_file(&mut self, name: &str, size: usize) -> Result<(), StorageError> {
        let path = match resolve_path("/", name, self.config.max_path_length) {
            Ok(path) => path,
            Err(PathError::TooLong { len, max }) => {
                return Err(StorageError::NameTooLong { len, max });
            }
        };
        self.file.publish(&path, size, self.clock.wall_time())?;
        info!("Published {} ({} bytes)", path, size);
        Ok(())
    }

    /// The virtual file registry, for reading a stored upload back out.
    pub fn file(&self) -> &VirtualFile {
        &self.file
    }

    /// Mutable access to the backing buffer so the host can fill it before
    /// publishing. Must not be used while a transfer is in flight.
    pub fn file_buffer_mut(&mut self) -> &mut [u8] {
        self.file.buffer_mut()
    }

    /// Drive the engine one tick. Returns the most recently completed
    /// transfer outcome exactly once per occurrence.
    pub fn poll(&mut self) -> TransferEvent {
        let now = self.clock.now_ms();

        if self.session.delay_until_ms > now {
            return TransferEvent::Idle;
        }

        // A newly pending control connection always preempts the current
        // one: last writer wins, no goodbye, any transfer is dropped.
        if self.channels.adopt_pending_control() {
            self.channels.close_data();
            self.session.transfer = TransferState::Idle;
        }

        match self.session.state {
            ConnectionState::Disconnected => {
                if self.channels.control_connected() {
                    abort_transfer(&mut self.session, &mut self.channels);
                    self.channels.close_control();
                }
                self.session.state = ConnectionState::AwaitClient;
            }
            ConnectionState::AwaitClient => {
                abort_transfer(&mut self.session, &mut self.channels);
                self.session.reset();
                debug!(
                    "Waiting for a control connection on port {}",
                    self.config.control_port
                );
                self.session.state = ConnectionState::Idle;
            }
            ConnectionState::Idle => {
                if self.channels.control_connected() {
                    self.greet_client(now);
                }
            }
            ConnectionState::AwaitUser | ConnectionState::AwaitPass | ConnectionState::Ready => {
                self.pump_control(now);
            }
        }

        self.step_transfer(now)
    }

    /// Send the welcome banner and arm the handshake deadline.
    fn greet_client(&mut self, now: u64) {
        info!("Client connected");
        self.channels
            .send_control_line("220--- Welcome to ramftp ---");
        self.channels
            .send_control_line("220--- single-file FTP service ---");
        self.channels
            .send_control_line(&format!("220 -- Version {} --", SERVER_VERSION));

        self.session.reader.reset();
        self.session.deadline_ms = now + HANDSHAKE_WAIT_MS;
        self.session.state = ConnectionState::AwaitUser;
    }

    /// Consume at most one control byte and act on a completed line.
    fn pump_control(&mut self, now: u64) {
        match self.channels.read_control_byte() {
            ByteRead::Closed => {
                info!("Client disconnected");
                self.session.state = ConnectionState::AwaitClient;
            }
            ByteRead::Pending => {}
            ByteRead::Byte(byte) => {
                if let Some(outcome) = self.session.reader.push(byte) {
                    match outcome {
                        LineOutcome::Overflow => {
                            self.channels.send_control_line("500 Syntax error");
                        }
                        LineOutcome::Empty => {}
                        LineOutcome::Line { verb, params } => {
                            self.handle_line(&verb, &params, now);
                        }
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, verb: &str, params: &str, now: u64) {
        debug!("Received {} {}", verb, params);

        match self.session.state {
            ConnectionState::AwaitUser => self.check_user(verb, params, now),
            ConnectionState::AwaitPass => self.check_password(verb, params, now),
            ConnectionState::Ready => self.dispatch(verb, params, now),
            _ => {}
        }
    }

    /// USER step of the handshake. Any failure disconnects after a short
    /// punitive delay.
    fn check_user(&mut self, verb: &str, params: &str, now: u64) {
        if verb != "USER" {
            self.channels.send_control_line("500 Syntax error");
        } else if let Err(e) = validate_user(&self.credentials, params) {
            warn!("Login rejected: {}", e);
            self.channels.send_control_line("530 Invalid username");
        } else {
            self.channels.send_control_line("331 Password required");
            self.session.cwd.clear();
            self.session.cwd.push('/');
            self.session.state = ConnectionState::AwaitPass;
            return;
        }

        self.session.delay_until_ms = now + AUTH_RETRY_DELAY_MS;
        self.session.state = ConnectionState::Disconnected;
    }

    /// PASS step of the handshake. Success arms the long inactivity
    /// deadline and enters the command loop.
    fn check_password(&mut self, verb: &str, params: &str, now: u64) {
        if verb != "PASS" {
            self.channels.send_control_line("500 Syntax error");
        } else if let Err(e) = validate_password(&self.credentials, params) {
            warn!("Login rejected: {}", e);
            self.channels.send_control_line("530 Invalid password");
        } else {
            info!("Client logged in");
            self.channels.send_control_line("230 Login successful");
            self.session.deadline_ms = now + self.config.idle_timeout_ms();
            self.session.state = ConnectionState::Ready;
            return;
        }

        self.session.delay_until_ms = now + AUTH_RETRY_DELAY_MS;
        self.session.state = ConnectionState::Disconnected;
    }

    /// Hand one completed line to the command dispatcher.
    fn dispatch(&mut self, verb: &str, params: &str, now: u64) {
        let command = parse_command(verb, params);

        let mut ctx = CommandContext {
            session: &mut self.session,
            file: &mut self.file,
            channels: &mut self.channels,
            transfer: &mut self.transfer,
            clock: &self.clock,
            config: &self.config,
        };
        let result = handle_command(&mut ctx, &command);

        match result.status {
            CommandStatus::CloseConnection => {
                abort_transfer(&mut self.session, &mut self.channels);
                if let Some(message) = result.message {
                    self.channels.send_control_line(&message);
                }
                self.channels.close_control();
                self.session.state = ConnectionState::Disconnected;
            }
            CommandStatus::Success => {
                if let Some(message) = result.message {
                    self.channels.send_control_line(&message);
                }
                self.session.deadline_ms = now + self.config.idle_timeout_ms();
            }
            CommandStatus::Failure(reason) => {
                debug!("Command {} failed: {}", verb, reason);
                if let Some(message) = result.message {
                    self.channels.send_control_line(&message);
                }
                self.session.deadline_ms = now + self.config.idle_timeout_ms();
            }
        }
    }

    /// Advance any in-flight transfer, surface one-shot notifications and
    /// enforce the inactivity deadline.
    fn step_transfer(&mut self, now: u64) -> TransferEvent {
        match self.session.transfer {
            TransferState::Retrieving => {
                let outcome = self
                    .transfer
                    .step_retrieve(&self.file, &mut self.channels, self.clock.now_ms());
                self.session.transfer = TransferState::Idle;
                match outcome {
                    StepOutcome::Done => TransferEvent::Retrieved,
                    _ => TransferEvent::Idle,
                }
            }
            TransferState::Storing => {
                match self
                    .transfer
                    .step_store(&mut self.file, &mut self.channels, &self.clock)
                {
                    StepOutcome::Continue => TransferEvent::Idle,
                    StepOutcome::Done => {
                        self.session.transfer = TransferState::Idle;
                        TransferEvent::Stored
                    }
                    StepOutcome::Aborted => {
                        self.session.transfer = TransferState::Idle;
                        TransferEvent::Idle
                    }
                }
            }
            TransferState::Deleted => {
                self.session.transfer = TransferState::Idle;
                TransferEvent::Deleted
            }
            TransferState::Renamed => {
                self.session.transfer = TransferState::Idle;
                TransferEvent::Renamed
            }
            TransferState::Idle => {
                if self.session.state > ConnectionState::Idle && now >= self.session.deadline_ms {
                    warn!("Session timed out");
                    self.channels.send_control_line("530 Timeout");
                    self.session.delay_until_ms = now + TIMEOUT_RETRY_DELAY_MS;
                    self.session.state = ConnectionState::Disconnected;
                }
                TransferEvent::Idle
            }
        }
    }
}
