//! Credential validation
//!
//! Validates USER and PASS arguments against the configured credentials.

use crate::auth::Credentials;
use crate::error::AuthError;

/// Validate the USER argument.
pub fn validate_user(credentials: &Credentials, username: &str) -> Result<(), AuthError> {
    if username == credentials.username() {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername(username.to_string()))
    }
}

/// Validate the PASS argument. An empty configured password accepts any
/// input.
pub fn validate_password(credentials: &Credentials, password: &str) -> Result<(), AuthError> {
    if !credentials.password_required() || password == credentials.password() {
        Ok(())
    } else {
        Err(AuthError::InvalidPassword)
    }
}
