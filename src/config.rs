//! Configuration management
//!
//! All limits and network parameters are fixed at startup: ports, the
//! inactivity timeout, the command/path/filename bounds and the scratch
//! buffer size are never renegotiated at runtime. Values load from
//! `config.toml` with `RAMFTP_*` environment overrides and are validated
//! before the server starts.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control and passive-data listeners bind to.
    pub bind_address: String,

    /// Control connection port.
    pub control_port: u16,

    /// Fixed passive-mode data port.
    pub data_port: u16,

    /// Minutes of command inactivity before the session is dropped.
    pub idle_timeout_mins: u64,

    /// Maximum length of one command line, terminator excluded.
    pub max_command_length: usize,

    /// Maximum length of a resolved absolute path.
    pub max_path_length: usize,

    /// Maximum length of the virtual file's name.
    pub max_filename_length: usize,

    /// Bytes read from the data channel per poll during a store.
    pub scratch_buffer_size: usize,

    /// Capacity of the backing buffer allocated by the binary.
    pub file_buffer_capacity: usize,

    /// Login credentials. An empty password disables the password check.
    pub username: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: 2121,
            data_port: 50009,
            idle_timeout_mins: 5,
            max_command_length: 263,
            max_path_length: 263,
            max_filename_length: 64,
            scratch_buffer_size: 1024,
            file_buffer_capacity: 1024,
            username: "user".to_string(),
            password: String::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `config.toml` with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("RAMFTP").try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// The inactivity timeout in milliseconds.
    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_mins * 60 * 1000
    }

    /// Validation for all configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_port == 0 {
            return Err(ConfigError::Message("Control port cannot be 0".into()));
        }

        if self.data_port == 0 {
            return Err(ConfigError::Message("Data port cannot be 0".into()));
        }

        if self.control_port == self.data_port {
            return Err(ConfigError::Message(
                "Control and data ports must differ".into(),
            ));
        }

        if self.idle_timeout_mins == 0 {
            return Err(ConfigError::Message(
                "idle_timeout_mins must be greater than 0".into(),
            ));
        }

        if self.max_command_length == 0 || self.max_path_length == 0 {
            return Err(ConfigError::Message(
                "Command and path limits must be greater than 0".into(),
            ));
        }

        if self.max_filename_length == 0 || self.max_filename_length > self.max_path_length {
            return Err(ConfigError::Message(
                "max_filename_length must be nonzero and fit within max_path_length".into(),
            ));
        }

        if self.scratch_buffer_size == 0 {
            return Err(ConfigError::Message(
                "scratch_buffer_size must be greater than 0".into(),
            ));
        }

        if self.file_buffer_capacity == 0 {
            return Err(ConfigError::Message(
                "file_buffer_capacity must be greater than 0".into(),
            ));
        }

        if self.username.is_empty() {
            return Err(ConfigError::Message("username cannot be empty".into()));
        }

        Ok(())
    }
}
