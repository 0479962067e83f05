//! Login credentials
//!
//! One username/password pair supplied at startup. An empty password means
//! the PASS argument is accepted unchecked.

use crate::config::ServerConfig;

#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.username.clone(), config.password.clone())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether a password check is enforced at all.
    pub fn password_required(&self) -> bool {
        !self.password.is_empty()
    }
}
