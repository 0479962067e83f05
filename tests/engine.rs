//! End-to-end tests for the protocol engine.
//!
//! The whole state machine is driven through fake channel, provider and
//! clock implementations: control bytes are scripted in, responses are
//! captured, and time only moves when a test advances it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};

use ramftp::channel::{Channel, ReadOutcome, SocketProvider};
use ramftp::clock::Clock;
use ramftp::{FtpServer, ServerConfig, TransferEvent};

#[derive(Clone)]
struct FakeClock {
    now: Rc<Cell<u64>>,
}

impl FakeClock {
    fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn wall_time(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

/// Test-side handle to one fake connection. The server end is a
/// [`FakeChannel`] sharing the same buffers.
#[derive(Clone, Default)]
struct Wire {
    rx: Rc<RefCell<VecDeque<u8>>>,
    tx: Rc<RefCell<Vec<u8>>>,
    open: Rc<Cell<bool>>,
    eof: Rc<Cell<bool>>,
}

impl Wire {
    fn new() -> Self {
        let wire = Self::default();
        wire.open.set(true);
        wire
    }

    fn channel(&self) -> FakeChannel {
        FakeChannel { wire: self.clone() }
    }

    fn push(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    fn push_str(&self, s: &str) {
        self.push(s.as_bytes());
    }

    /// The peer closes its end after everything queued has been read.
    fn finish(&self) {
        self.eof.set(true);
    }

    fn output(&self) -> String {
        String::from_utf8_lossy(&self.tx.borrow()).into_owned()
    }

    fn output_bytes(&self) -> Vec<u8> {
        self.tx.borrow().clone()
    }

    fn take_output(&self) -> String {
        let mut tx = self.tx.borrow_mut();
        let out = String::from_utf8_lossy(&tx).into_owned();
        tx.clear();
        out
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }
}

struct FakeChannel {
    wire: Wire,
}

impl Channel for FakeChannel {
    fn poll_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if !self.wire.open.get() {
            return ReadOutcome::Closed;
        }

        let mut rx = self.wire.rx.borrow_mut();
        if rx.is_empty() {
            if self.wire.eof.get() {
                self.wire.open.set(false);
                return ReadOutcome::Closed;
            }
            return ReadOutcome::Pending;
        }

        let n = buf.len().min(rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = rx.pop_front().unwrap();
        }
        ReadOutcome::Data(n)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.wire.open.get() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        self.wire.tx.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.wire.open.get()
    }

    fn close(&mut self) {
        self.wire.open.set(false);
    }
}

#[derive(Clone, Default)]
struct FakeProvider {
    control_pending: Rc<RefCell<VecDeque<Wire>>>,
    data_pending: Rc<RefCell<VecDeque<Wire>>>,
}

impl SocketProvider for FakeProvider {
    type Ctrl = FakeChannel;
    type Data = FakeChannel;

    fn poll_control_client(&mut self) -> Option<FakeChannel> {
        self.control_pending
            .borrow_mut()
            .pop_front()
            .map(|w| w.channel())
    }

    fn poll_data_client(&mut self) -> Option<FakeChannel> {
        self.data_pending
            .borrow_mut()
            .pop_front()
            .map(|w| w.channel())
    }

    fn local_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 7)
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        username: "u".to_string(),
        password: "p".to_string(),
        ..ServerConfig::default()
    }
}

struct Harness {
    server: FtpServer<FakeProvider, FakeClock>,
    provider: FakeProvider,
    clock: FakeClock,
    ctrl: Wire,
}

impl Harness {
    fn start(capacity: usize) -> Self {
        Self::start_with(capacity, test_config())
    }

    fn start_with(capacity: usize, config: ServerConfig) -> Self {
        let provider = FakeProvider::default();
        let clock = FakeClock::new();
        let server = FtpServer::new(
            provider.clone(),
            clock.clone(),
            config,
            vec![0u8; capacity].into_boxed_slice(),
        );

        let mut harness = Self {
            server,
            provider,
            clock,
            ctrl: Wire::new(),
        };
        harness.connect_client();
        harness
    }

    /// Walk the machine to `Idle`, then present a fresh control client and
    /// let it be greeted.
    fn connect_client(&mut self) {
        self.pump(2);
        let wire = Wire::new();
        self.provider.control_pending.borrow_mut().push_back(wire.clone());
        self.ctrl = wire;
        self.pump(2);
    }

    fn pump(&mut self, ticks: usize) -> Vec<TransferEvent> {
        (0..ticks)
            .map(|_| self.server.poll())
            .filter(|e| *e != TransferEvent::Idle)
            .collect()
    }

    /// Queue one command line and poll until it has been consumed.
    fn send(&mut self, line: &str) -> Vec<TransferEvent> {
        self.ctrl.push_str(line);
        self.ctrl.push_str("\r\n");
        self.pump(line.len() + 8)
    }

    fn login(&mut self) {
        self.send("USER u");
        self.send("PASS p");
    }

    /// Present a client connection on the passive data listener.
    fn offer_data(&mut self) -> Wire {
        let wire = Wire::new();
        self.provider.data_pending.borrow_mut().push_back(wire.clone());
        wire
    }

    fn publish(&mut self, name: &str, contents: &[u8]) {
        self.server.file_buffer_mut()[..contents.len()].copy_from_slice(contents);
        self.server.publish_file(name, contents.len()).unwrap();
    }
}

#[test]
fn greets_with_three_line_banner() {
    let h = Harness::start(16);
    let out = h.ctrl.output();
    assert!(out.contains("220--- Welcome to ramftp ---\r\n"));
    assert!(out.contains("220--- single-file FTP service ---\r\n"));
    assert!(out.contains("220 -- Version "));
}

#[test]
fn login_handshake_succeeds() {
    let mut h = Harness::start(16);
    h.send("USER u");
    assert!(h.ctrl.output().contains("331 Password required"));
    h.send("PASS p");
    assert!(h.ctrl.output().contains("230 Login successful"));
}

#[test]
fn wrong_username_disconnects_with_530() {
    let mut h = Harness::start(16);
    h.send("USER nobody");
    assert!(h.ctrl.output().contains("530 Invalid username"));

    // Punitive delay, then the server accepts a fresh client again.
    h.clock.advance(101);
    h.connect_client();
    assert!(h.ctrl.output().contains("220--- Welcome to ramftp ---"));
    h.login();
    assert!(h.ctrl.output().contains("230 Login successful"));
}

#[test]
fn wrong_password_disconnects_with_530() {
    let mut h = Harness::start(16);
    h.send("USER u");
    h.send("PASS wrong");
    assert!(h.ctrl.output().contains("530 Invalid password"));

    // The connection is torn down once the punitive delay passes.
    h.clock.advance(101);
    h.pump(1);
    assert!(!h.ctrl.is_open());
}

#[test]
fn empty_configured_password_accepts_anything() {
    let config = ServerConfig {
        username: "u".to_string(),
        password: String::new(),
        ..ServerConfig::default()
    };
    let mut h = Harness::start_with(16, config);
    h.send("USER u");
    h.send("PASS whatever");
    assert!(h.ctrl.output().contains("230 Login successful"));
}

#[test]
fn non_user_verb_during_handshake_is_a_syntax_error() {
    let mut h = Harness::start(16);
    h.send("PASS p");
    assert!(h.ctrl.output().contains("500 Syntax error"));
}

#[test]
fn retr_round_trip() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.send("TYPE I");
    h.ctrl.take_output();

    let data = h.offer_data();
    let events = h.send("RETR test.txt");
    assert_eq!(events, vec![TransferEvent::Retrieved]);

    let out = h.ctrl.output();
    assert!(out.contains("150-Connected to port 50009"));
    assert!(out.contains("150 5 bytes to download"));
    assert!(out.contains("226 File successfully transferred"));
    assert_eq!(data.output_bytes(), b"hello");
    assert!(!data.is_open());

    // The outcome is surfaced exactly once.
    assert!(h.pump(10).is_empty());
}

#[test]
fn stored_bytes_read_back_identically() {
    let mut h = Harness::start(64);
    h.login();

    let data = h.offer_data();
    h.send("STOR up.bin");
    assert!(h.ctrl.output().contains("150 Connected to port 50009"));

    data.push(b"hello world");
    data.finish();
    let events = h.pump(4);
    assert_eq!(events, vec![TransferEvent::Stored]);
    assert!(h.ctrl.output().contains("226 File successfully transferred"));
    assert_eq!(h.server.file().data(), b"hello world");
    assert_eq!(h.server.file().name(), Some("/up.bin"));

    h.send("SIZE up.bin");
    assert!(h.ctrl.output().contains("213 11"));

    let data = h.offer_data();
    let events = h.send("RETR up.bin");
    assert_eq!(events, vec![TransferEvent::Retrieved]);
    assert_eq!(data.output_bytes(), b"hello world");
}

#[test]
fn store_reports_throughput_when_time_elapsed() {
    let mut h = Harness::start(64);
    h.login();

    let data = h.offer_data();
    h.send("STOR up.bin");
    data.push(b"hello world");
    h.pump(2);
    h.clock.advance(50);
    data.finish();
    h.pump(2);

    let out = h.ctrl.output();
    assert!(out.contains("226-File successfully transferred"));
    assert!(out.contains("ms,"));
}

#[test]
fn oversized_store_aborts_and_unmounts() {
    let mut h = Harness::start(8);
    h.login();

    let data = h.offer_data();
    h.send("STOR big.bin");
    data.push(b"way more than eight bytes");
    data.finish();

    let events = h.pump(4);
    assert!(events.is_empty());
    assert!(h.ctrl.output().contains("426 Transfer aborted"));
    assert!(!h.server.file().is_mounted());
    assert!(!data.is_open());

    // The aborted name must not be servable afterwards.
    h.ctrl.take_output();
    h.send("SIZE big.bin");
    assert!(h.ctrl.output().contains("450 Can't open big.bin"));
    h.send("RETR big.bin");
    assert!(h.ctrl.output().contains("550 File big.bin not found"));
}

#[test]
fn pasv_reply_encodes_local_endpoint() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();
    h.send("PASV");
    // 50009 = 195 * 256 + 89
    assert!(h
        .ctrl
        .output()
        .contains("227 Entering Passive Mode (192,168,1,7,195,89)."));
}

#[test]
fn port_records_endpoint_but_data_stays_passive() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    h.send("PORT 127,0,0,1,4,1");
    assert!(h.ctrl.output().contains("200 PORT command successful"));

    // The advertised endpoint shows up in the 150 reply, but the transfer
    // still runs over a connection accepted on the passive listener.
    let data = h.offer_data();
    let events = h.send("RETR test.txt");
    assert_eq!(events, vec![TransferEvent::Retrieved]);
    assert!(h.ctrl.output().contains("150-Connected to port 1025"));
    assert_eq!(data.output_bytes(), b"hello");
}

#[test]
fn malformed_port_is_rejected() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();
    h.send("PORT nonsense");
    assert!(h.ctrl.output().contains("501 Can't interpret parameters"));
}

#[test]
fn cwd_never_leaves_the_root() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.send("CWD /deep/dir");
    assert!(h.ctrl.output().contains("250 Ok. Current directory is /"));
    h.send("PWD");
    assert!(h.ctrl.output().contains("257 \"/\" is your current directory"));
    h.send("CWD .");
    assert!(h.ctrl.output().contains("257 \"/\" is your current directory"));
    h.send("CDUP");
    assert!(h.ctrl.output().contains("250 Ok. Current directory is /"));
}

#[test]
fn oversized_verb_never_reaches_the_dispatcher() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    h.send("RETRIEVE test.txt");
    let out = h.ctrl.output();
    assert!(out.contains("500 Syntax error"));
    assert!(!out.contains("150"));
    assert!(!out.contains("550"));
}

#[test]
fn dele_clears_only_the_matching_mount() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    let events = h.send("DELE other.txt");
    assert!(events.is_empty());
    assert!(h.ctrl.output().contains("550 File other.txt not found"));
    h.send("SIZE test.txt");
    assert!(h.ctrl.output().contains("213 5"));

    h.ctrl.take_output();
    let events = h.send("DELE test.txt");
    assert_eq!(events, vec![TransferEvent::Deleted]);
    assert!(h.ctrl.output().contains("250 Deleted test.txt"));

    h.send("SIZE test.txt");
    assert!(h.ctrl.output().contains("450 Can't open test.txt"));
}

#[test]
fn rename_requires_rnfr_and_rejects_collisions() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    h.send("RNTO new.txt");
    assert!(h.ctrl.output().contains("503 Need RNFR before RNTO"));

    h.send("RNFR missing.txt");
    assert!(h.ctrl.output().contains("550 File missing.txt not found"));

    h.send("RNFR test.txt");
    assert!(h
        .ctrl
        .output()
        .contains("350 RNFR accepted - file exists, ready for destination"));

    h.ctrl.take_output();
    let events = h.send("RNTO new.txt");
    assert_eq!(events, vec![TransferEvent::Renamed]);
    assert!(h.ctrl.output().contains("250 File successfully renamed or moved"));

    h.send("SIZE new.txt");
    assert!(h.ctrl.output().contains("213 5"));
    h.send("SIZE test.txt");
    assert!(h.ctrl.output().contains("450 Can't open test.txt"));

    // Renaming onto the current name collides.
    h.ctrl.take_output();
    h.send("RNFR new.txt");
    h.send("RNTO new.txt");
    assert!(h.ctrl.output().contains("553 new.txt already exists"));
}

#[test]
fn listings_show_the_single_mounted_file() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    let data = h.offer_data();
    h.send("LIST");
    assert!(h.ctrl.output().contains("150 Accepted data connection"));
    assert!(h.ctrl.output().contains("226 1 matches total"));
    assert_eq!(data.output(), "05-01-2024 12:30PM 5 test.txt\r\n");

    let data = h.offer_data();
    h.send("NLST");
    assert_eq!(data.output(), "test.txt\r\n");

    let data = h.offer_data();
    h.ctrl.take_output();
    h.send("MLSD");
    let out = h.ctrl.output();
    assert!(out.contains("226-options: -a -l"));
    assert!(out.contains("226 1 matches total"));
    assert_eq!(data.output(), "Type=file;Size=5;modify=20240501123000; test.txt\r\n");
}

#[test]
fn listing_without_a_mount_reports_zero_matches() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    let data = h.offer_data();
    h.send("LIST");
    assert!(h.ctrl.output().contains("226 0 matches total"));
    assert!(data.output().is_empty());
}

#[test]
fn listing_without_a_data_connection_fails_with_425() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    // No data client ever dials in; the bounded wait expires.
    h.send("LIST");
    assert!(h.ctrl.output().contains("425 No data connection"));
}

#[test]
fn inactivity_timeout_recycles_the_session() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.clock.advance(5 * 60 * 1000 + 1);
    h.pump(1);
    assert!(h.ctrl.output().contains("530 Timeout"));

    // After the retry delay a fresh client is greeted and can log in.
    h.clock.advance(201);
    h.connect_client();
    assert!(h.ctrl.output().contains("220--- Welcome to ramftp ---"));
    h.login();
    assert!(h.ctrl.output().contains("230 Login successful"));
}

#[test]
fn handshake_deadline_applies_before_login() {
    let mut h = Harness::start(16);
    h.clock.advance(10_001);
    h.pump(1);
    assert!(h.ctrl.output().contains("530 Timeout"));
}

#[test]
fn quit_says_goodbye_and_closes() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.send("QUIT");
    assert!(h.ctrl.output().contains("221 Goodbye"));
    assert!(!h.ctrl.is_open());

    h.connect_client();
    assert!(h.ctrl.output().contains("220--- Welcome to ramftp ---"));
}

#[test]
fn new_control_connection_preempts_the_old_one() {
    let mut h = Harness::start(16);
    h.login();
    let old = h.ctrl.clone();

    let fresh = Wire::new();
    h.provider.control_pending.borrow_mut().push_back(fresh.clone());
    h.pump(2);
    assert!(!old.is_open());

    // Last writer wins: the fresh client talks to the same session.
    h.ctrl = fresh;
    h.send("PWD");
    assert!(h.ctrl.output().contains("257 \"/\" is your current directory"));
}

#[test]
fn abor_closes_the_data_channel() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.send("ABOR");
    assert!(h.ctrl.output().contains("226 Data connection closed"));
}

#[test]
fn transfer_parameter_commands() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.send("MODE S");
    h.send("STRU F");
    h.send("TYPE A");
    h.send("TYPE I");
    let out = h.ctrl.take_output();
    assert!(out.contains("200 S Ok"));
    assert!(out.contains("200 F Ok"));
    assert!(out.contains("200 TYPE is now ASCII"));
    assert!(out.contains("200 TYPE is now 8-bit binary"));

    h.send("MODE B");
    h.send("STRU R");
    h.send("TYPE X");
    let out = h.ctrl.take_output();
    assert!(out.contains("504 Only S(tream) is supported"));
    assert!(out.contains("504 Only F(ile) is supported"));
    assert!(out.contains("504 Unknown TYPE"));
}

#[test]
fn stub_and_unknown_commands() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    h.send("MKD dir");
    h.send("RMD dir");
    h.send("SITE CHMOD 644 x");
    h.send("NOOP");
    h.send("FEAT");
    h.send("XYZ");
    let out = h.ctrl.output();
    assert!(out.contains("550 Can't create \"dir\""));
    assert!(out.contains("501 Can't delete \"dir\""));
    assert!(out.contains("500 Unknown SITE command CHMOD 644 x"));
    assert!(out.contains("200 Zzz..."));
    assert!(out.contains("211-Extensions supported:"));
    assert!(out.contains("211 End."));
    assert!(out.contains("500 Unknown command"));
}

#[test]
fn missing_file_names_answer_501() {
    let mut h = Harness::start(16);
    h.login();
    h.ctrl.take_output();

    for verb in ["RETR", "DELE", "RNFR", "SIZE", "MDTM", "STOR"] {
        h.send(verb);
    }
    let out = h.ctrl.output();
    assert_eq!(out.matches("501 No file name").count(), 6);
}

#[test]
fn mdtm_reports_the_publish_stamp() {
    let mut h = Harness::start(16);
    h.publish("test.txt", b"hello");
    h.login();
    h.ctrl.take_output();

    h.send("MDTM test.txt");
    assert!(h.ctrl.output().contains("213 20240501123000"));
}

#[test]
fn mid_session_publish_replaces_the_mount() {
    let mut h = Harness::start(16);
    h.publish("a.txt", b"aaa");
    h.login();
    h.ctrl.take_output();

    h.publish("b.txt", b"bbbb");
    h.send("SIZE b.txt");
    assert!(h.ctrl.output().contains("213 4"));
    h.send("SIZE a.txt");
    assert!(h.ctrl.output().contains("450 Can't open a.txt"));
}
