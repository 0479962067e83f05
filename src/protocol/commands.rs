//! Command parsing and result types
//!
//! Maps a completed command line (verb + parameter tail) onto the supported
//! FTP verb set and defines the result types handlers report back to the
//! connection state machine.

/// An FTP command parsed from a completed line.
///
/// Verbs that take a path or argument carry it as a `String`; handlers are
/// responsible for rejecting an empty argument with `501`, matching the
/// per-command responses of the protocol.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    // Access control
    Cdup,
    Cwd(String),
    Pwd,
    Quit,
    // Transfer parameters
    Mode(String),
    Stru(String),
    Type(String),
    Pasv,
    Port(String),
    // Service
    Abor,
    Dele(String),
    List,
    Mlsd,
    Nlst,
    Noop,
    Retr(String),
    Stor(String),
    Mkd(String),
    Rmd(String),
    Rnfr(String),
    Rnto(String),
    // RFC 3659 extensions
    Feat,
    Mdtm(String),
    Size(String),
    Site(String),
    /// Anything else answers `500 Unknown command`.
    Unknown,
}

/// Outcome status of executing a command.
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Full result of a command execution: status plus the control-channel
/// response (one or more CRLF-terminated lines).
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            message: Some(message.into()),
        }
    }
}

/// Parse an upper-cased verb and its parameter tail into a [`Command`].
pub fn parse_command(verb: &str, params: &str) -> Command {
    let arg = || params.to_string();

    match verb {
        "CDUP" => Command::Cdup,
        "CWD" => Command::Cwd(arg()),
        "PWD" => Command::Pwd,
        "QUIT" => Command::Quit,
        "MODE" => Command::Mode(arg()),
        "STRU" => Command::Stru(arg()),
        "TYPE" => Command::Type(arg()),
        "PASV" => Command::Pasv,
        "PORT" => Command::Port(arg()),
        "ABOR" => Command::Abor,
        "DELE" => Command::Dele(arg()),
        "LIST" => Command::List,
        "MLSD" => Command::Mlsd,
        "NLST" => Command::Nlst,
        "NOOP" => Command::Noop,
        "RETR" => Command::Retr(arg()),
        "STOR" => Command::Stor(arg()),
        "MKD" => Command::Mkd(arg()),
        "RMD" => Command::Rmd(arg()),
        "RNFR" => Command::Rnfr(arg()),
        "RNTO" => Command::Rnto(arg()),
        "FEAT" => Command::Feat,
        "MDTM" => Command::Mdtm(arg()),
        "SIZE" => Command::Size(arg()),
        "SITE" => Command::Site(arg()),
        _ => Command::Unknown,
    }
}
