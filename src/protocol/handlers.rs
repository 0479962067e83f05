//! Command handlers
//!
//! One handler per supported verb, dispatched from the connection state
//! machine once a client is logged in. Handlers run against the session,
//! the virtual file registry and the channel hub, and report their control
//! response through [`CommandResult`].

use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};

use log::{info, warn};

use crate::channel::{Channels, SocketProvider, DATA_CONNECT_WAIT_MS};
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::PathError;
use crate::protocol::resolver::resolve_path;
use crate::protocol::responses;
use crate::protocol::{Command, CommandResult, CommandStatus};
use crate::session::{Session, TransferState};
use crate::storage::{FileEntry, VirtualFile};
use crate::transfer::{abort_transfer, TransferEngine};

/// Everything a handler may touch, borrowed from the server for the
/// duration of one command.
pub struct CommandContext<'a, P: SocketProvider, C: Clock> {
    pub session: &'a mut Session,
    pub file: &'a mut VirtualFile,
    pub channels: &'a mut Channels<P>,
    pub transfer: &'a mut TransferEngine,
    pub clock: &'a C,
    pub config: &'a ServerConfig,
}

/// Dispatches a parsed command to its handler.
pub fn handle_command<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    command: &Command,
) -> CommandResult {
    match command {
        Command::Cdup => handle_cmd_cdup(ctx),
        Command::Cwd(path) => handle_cmd_cwd(ctx, path),
        Command::Pwd => handle_cmd_pwd(ctx),
        Command::Quit => handle_cmd_quit(),
        Command::Mode(param) => handle_cmd_mode(param),
        Command::Stru(param) => handle_cmd_stru(param),
        Command::Type(param) => handle_cmd_type(param),
        Command::Pasv => handle_cmd_pasv(ctx),
        Command::Port(param) => handle_cmd_port(ctx, param),
        Command::Abor => handle_cmd_abor(ctx),
        Command::Dele(path) => handle_cmd_dele(ctx, path),
        Command::List => handle_cmd_list(ctx),
        Command::Mlsd => handle_cmd_mlsd(ctx),
        Command::Nlst => handle_cmd_nlst(ctx),
        Command::Noop => handle_cmd_noop(),
        Command::Retr(path) => handle_cmd_retr(ctx, path),
        Command::Stor(path) => handle_cmd_stor(ctx, path),
        Command::Mkd(path) => handle_cmd_mkd(path),
        Command::Rmd(path) => handle_cmd_rmd(path),
        Command::Rnfr(path) => handle_cmd_rnfr(ctx, path),
        Command::Rnto(path) => handle_cmd_rnto(ctx, path),
        Command::Feat => handle_cmd_feat(),
        Command::Mdtm(path) => handle_cmd_mdtm(ctx, path),
        Command::Size(path) => handle_cmd_size(ctx, path),
        Command::Site(param) => handle_cmd_site(param),
        Command::Unknown => handle_cmd_unknown(),
    }
}

/// Resolve a path parameter against the session's current directory.
fn resolve_or_fail(cwd: &str, param: &str, max_len: usize) -> Result<String, CommandResult> {
    resolve_path(cwd, param, max_len).map_err(|e: PathError| {
        warn!("Path resolution failed: {}", e);
        CommandResult::failure(e.to_string(), "553 Path name too long")
    })
}

fn require_file_name(param: &str) -> Option<CommandResult> {
    if param.is_empty() {
        Some(CommandResult::failure(
            "Missing file name",
            "501 No file name",
        ))
    } else {
        None
    }
}

/// Handles CDUP: the root has no parent, so this is a cosmetic success.
fn handle_cmd_cdup<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    CommandResult::success(format!("250 Ok. Current directory is {}", ctx.session.cwd))
}

/// Handles CWD: `CWD .` behaves like PWD; anything else reports success
/// without changing the directory. There is no hierarchy to walk.
fn handle_cmd_cwd<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    path: &str,
) -> CommandResult {
    if path == "." {
        handle_cmd_pwd(ctx)
    } else {
        CommandResult::success(format!("250 Ok. Current directory is {}", ctx.session.cwd))
    }
}

/// Handles PWD: reports the fixed root directory.
fn handle_cmd_pwd<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    CommandResult::success(format!(
        "257 \"{}\" is your current directory",
        ctx.session.cwd
    ))
}

/// Handles QUIT: says goodbye and signals connection close.
fn handle_cmd_quit() -> CommandResult {
    CommandResult {
        status: CommandStatus::CloseConnection,
        message: Some("221 Goodbye".to_string()),
    }
}

fn handle_cmd_mode(param: &str) -> CommandResult {
    if param == "S" {
        CommandResult::success("200 S Ok")
    } else {
        CommandResult::failure("Unsupported mode", "504 Only S(tream) is supported")
    }
}

fn handle_cmd_stru(param: &str) -> CommandResult {
    if param == "F" {
        CommandResult::success("200 F Ok")
    } else {
        CommandResult::failure("Unsupported structure", "504 Only F(ile) is supported")
    }
}

fn handle_cmd_type(param: &str) -> CommandResult {
    match param {
        "A" => CommandResult::success("200 TYPE is now ASCII"),
        "I" => CommandResult::success("200 TYPE is now 8-bit binary"),
        _ => CommandResult::failure("Unsupported type", "504 Unknown TYPE"),
    }
}

/// Handles PASV: re-arms the fixed passive listener and reports its
/// endpoint. Any open data connection is dropped first.
fn handle_cmd_pasv<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    ctx.channels.close_data();
    ctx.session.passive_mode = true;
    ctx.session.data_port = ctx.config.data_port;

    CommandResult::success(responses::passive_mode_reply(
        ctx.channels.local_ip(),
        ctx.config.data_port,
    ))
}

/// Handles PORT: records the client's advertised endpoint and flips the
/// passive flag. The engine keeps accepting data connections on its own
/// passive listener; the recorded address is never dialed.
fn handle_cmd_port<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    ctx.channels.close_data();

    let Some(addr) = parse_port_argument(param) else {
        return CommandResult::failure("Malformed PORT", "501 Can't interpret parameters");
    };

    info!(
        "Active mode endpoint recorded: {} (data connections are still accepted passively)",
        addr
    );
    ctx.session.remote_data_addr = Some(addr);
    ctx.session.data_port = addr.port();
    ctx.session.passive_mode = false;

    CommandResult::success("200 PORT command successful")
}

/// Parse `h1,h2,h3,h4,p1,p2` into an endpoint.
fn parse_port_argument(param: &str) -> Option<SocketAddrV4> {
    let octets: Vec<u8> = param
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<Vec<u8>>>()?;

    if octets.len() != 6 {
        return None;
    }

    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = (u16::from(octets[4]) << 8) | u16::from(octets[5]);
    Some(SocketAddrV4::new(ip, port))
}

/// Handles ABOR: force-closes the data channel and resets transfer state.
fn handle_cmd_abor<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    abort_transfer(ctx.session, ctx.channels);
    CommandResult::success("226 Data connection closed")
}

/// Handles DELE: unmounts the file when the resolved path matches it.
fn handle_cmd_dele<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    if let Some(result) = require_file_name(param) {
        return result;
    }

    let path = match resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length) {
        Ok(path) => path,
        Err(result) => return result,
    };

    if !ctx.file.matches(&path) {
        return CommandResult::failure(
            "File not found",
            format!("550 File {} not found", param),
        );
    }

    ctx.file.clear();
    // A stale RNFR cannot target the cleared mount.
    ctx.session.rename_pending = false;
    ctx.session.transfer = TransferState::Deleted;
    info!("Deleted {}", path);

    CommandResult::success(format!("250 Deleted {}", param))
}

/// Shared body of the three listing verbs: the directory holds at most one
/// entry, the mounted file.
fn send_listing<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    entry_line: impl Fn(&FileEntry<'_>) -> String,
) -> Result<usize, CommandResult> {
    if !ctx.channels.connect_data(ctx.clock, DATA_CONNECT_WAIT_MS) {
        return Err(CommandResult::failure(
            "No data connection",
            "425 No data connection",
        ));
    }

    ctx.channels.send_control_line("150 Accepted data connection");

    let mut matches = 0;
    if let Some(entry) = ctx.file.entry() {
        let line = entry_line(&entry);
        if let Err(e) = ctx.channels.send_data_line(&line) {
            warn!("Failed to send listing entry: {}", e);
        }
        matches += 1;
    }

    ctx.channels.close_data();
    Ok(matches)
}

/// Handles LIST: one legacy-format line per mounted file (zero or one).
fn handle_cmd_list<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    match send_listing(ctx, responses::list_entry) {
        Ok(matches) => CommandResult::success(format!("226 {} matches total", matches)),
        Err(result) => result,
    }
}

/// Handles NLST: bare name listing.
fn handle_cmd_nlst<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    match send_listing(ctx, |entry| entry.display_name().to_string()) {
        Ok(matches) => CommandResult::success(format!("226 {} matches total", matches)),
        Err(result) => result,
    }
}

/// Handles MLSD: machine-readable listing (RFC 3659).
fn handle_cmd_mlsd<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
) -> CommandResult {
    match send_listing(ctx, responses::mlsd_entry) {
        Ok(matches) => {
            ctx.channels.send_control_line("226-options: -a -l");
            CommandResult::success(format!("226 {} matches total", matches))
        }
        Err(result) => result,
    }
}

fn handle_cmd_noop() -> CommandResult {
    CommandResult::success("200 Zzz...")
}

/// Handles RETR: arms a retrieve transfer when the resolved path matches
/// the mounted file and a data connection is up.
fn handle_cmd_retr<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    if let Some(result) = require_file_name(param) {
        return result;
    }

    let path = match resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length) {
        Ok(path) => path,
        Err(result) => return result,
    };

    if !ctx.file.matches(&path) {
        return CommandResult::failure(
            "File not found",
            format!("550 File {} not found", param),
        );
    }

    if !ctx.channels.connect_data(ctx.clock, DATA_CONNECT_WAIT_MS) {
        return CommandResult::failure("No data connection", "425 No data connection");
    }

    info!("Sending {}", path);
    ctx.transfer.begin(ctx.clock.now_ms());
    ctx.session.transfer = TransferState::Retrieving;

    CommandResult::success(format!(
        "150-Connected to port {}\r\n150 {} bytes to download",
        ctx.session.data_port,
        ctx.file.size()
    ))
}

/// Handles STOR: mount-truncates under the resolved name and arms a store
/// transfer. The previous mount, if any, is overwritten.
fn handle_cmd_stor<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    if let Some(result) = require_file_name(param) {
        return result;
    }

    let path = match resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length) {
        Ok(path) => path,
        Err(result) => return result,
    };

    if !ctx.channels.connect_data(ctx.clock, DATA_CONNECT_WAIT_MS) {
        return CommandResult::failure("No data connection", "425 No data connection");
    }

    if let Err(e) = ctx.file.begin_store(&path, ctx.clock.wall_time()) {
        warn!("STOR rejected: {}", e);
        ctx.channels.close_data();
        return CommandResult::failure(e.to_string(), "553 File name too long");
    }

    info!("Receiving {}", path);
    ctx.transfer.begin(ctx.clock.now_ms());
    ctx.session.transfer = TransferState::Storing;

    CommandResult::success(format!("150 Connected to port {}", ctx.session.data_port))
}

fn handle_cmd_mkd(param: &str) -> CommandResult {
    CommandResult::failure(
        "No filesystem",
        format!("550 Can't create \"{}\"", param),
    )
}

fn handle_cmd_rmd(param: &str) -> CommandResult {
    CommandResult::failure(
        "No filesystem",
        format!("501 Can't delete \"{}\"", param),
    )
}

/// Handles RNFR: marks the mounted file as pending rename.
fn handle_cmd_rnfr<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    if let Some(result) = require_file_name(param) {
        return result;
    }

    let path = match resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length) {
        Ok(path) => path,
        Err(result) => return result,
    };

    if !ctx.file.matches(&path) {
        return CommandResult::failure(
            "File not found",
            format!("550 File {} not found", param),
        );
    }

    ctx.session.rename_pending = true;
    CommandResult::success("350 RNFR accepted - file exists, ready for destination")
}

/// Handles RNTO: relabels the mount. Requires a preceding RNFR; the
/// pending flag is consumed whatever the outcome.
fn handle_cmd_rnto<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    let pending = mem::replace(&mut ctx.session.rename_pending, false);
    if !pending || !ctx.file.is_mounted() {
        return CommandResult::failure("RNFR missing", "503 Need RNFR before RNTO");
    }

    if let Some(result) = require_file_name(param) {
        return result;
    }

    let path = match resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length) {
        Ok(path) => path,
        Err(result) => return result,
    };

    if ctx.file.matches(&path) {
        return CommandResult::failure(
            "Target exists",
            format!("553 {} already exists", param),
        );
    }

    if let Err(e) = ctx.file.rename(&path) {
        warn!("RNTO rejected: {}", e);
        return CommandResult::failure(e.to_string(), "553 File name too long");
    }

    ctx.session.transfer = TransferState::Renamed;
    info!("Renamed to {}", path);

    CommandResult::success("250 File successfully renamed or moved")
}

fn handle_cmd_feat() -> CommandResult {
    CommandResult::success("211-Extensions supported:\r\n MLSD\r\n211 End.")
}

/// Handles MDTM: modification time of the mounted file (RFC 3659).
fn handle_cmd_mdtm<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    match mounted_entry(ctx, param) {
        Ok(entry) => {
            let stamp = responses::modify_timestamp(entry.modified);
            CommandResult::success(format!("213 {}", stamp))
        }
        Err(result) => result,
    }
}

/// Handles SIZE: byte size of the mounted file.
fn handle_cmd_size<P: SocketProvider, C: Clock>(
    ctx: &mut CommandContext<'_, P, C>,
    param: &str,
) -> CommandResult {
    match mounted_entry(ctx, param) {
        Ok(entry) => CommandResult::success(format!("213 {}", entry.size)),
        Err(result) => result,
    }
}

/// Shared gate for SIZE/MDTM: the parameter must resolve to the mounted
/// file's exact path.
fn mounted_entry<'a, P: SocketProvider, C: Clock>(
    ctx: &'a CommandContext<'_, P, C>,
    param: &str,
) -> Result<FileEntry<'a>, CommandResult> {
    if let Some(result) = require_file_name(param) {
        return Err(result);
    }

    let path = resolve_or_fail(&ctx.session.cwd, param, ctx.config.max_path_length)?;

    if !ctx.file.matches(&path) {
        return Err(CommandResult::failure(
            "File not found",
            format!("450 Can't open {}", param),
        ));
    }

    ctx.file
        .entry()
        .ok_or_else(|| CommandResult::failure("File not found", format!("450 Can't open {}", param)))
}

fn handle_cmd_site(param: &str) -> CommandResult {
    CommandResult::failure(
        "Unsupported SITE",
        format!("500 Unknown SITE command {}", param),
    )
}

fn handle_cmd_unknown() -> CommandResult {
    CommandResult::failure("Unknown command", "500 Unknown command")
}
