//! tiko-todos core library.
//!
//! Client side of the hosted todo service: a session manager that owns the
//! access/refresh token pair and renews it transparently, a typed REST
//! client, and todo CRUD on top of both.
//!
//! ```ignore
//! let config = Config::load()?;
//! let session = SessionManager::new(config.api_client()?, Arc::new(KeyringTokenStore::new()))
//!     .with_trust_window(config.trust_window());
//! session.restore().await?;
//! let todos = TodoClient::new(session.clone()).list().await?;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, TodoClient};
pub use auth::{
    AuthError, KeyringTokenStore, MemoryTokenStore, RegistrationProfile, Session, SessionManager,
    SessionStatus, TokenPair, TokenStore, ValidationError,
};
pub use config::Config;
pub use models::Todo;
