//! Authentication
//!
//! Credential storage and USER/PASS validation for the login handshake.

pub mod credentials;
pub mod validator;

pub use credentials::Credentials;
pub use validator::{validate_password, validate_user};
