//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: login, register, logout and transparent token refresh
//! - `Session`: the current token pair and its lifecycle status
//! - `TokenStore`: secure persistence of the token pair (OS keychain via keyring)
//!
//! Access tokens are short-lived. A rejected access token is renewed once
//! with the refresh token; if that fails the session expires and the user
//! has to log in again.

pub mod error;
pub mod manager;
pub mod session;
pub mod store;
pub mod validation;

pub use error::{AuthError, ValidationError};
pub use manager::{SessionManager, DEFAULT_TRUST_SECS};
pub use session::{Session, SessionStatus, TokenPair};
pub use store::{KeyringTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use validation::{is_valid_email, RegistrationProfile, MIN_PASSWORD_LENGTH};
