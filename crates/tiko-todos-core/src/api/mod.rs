//! REST API client module for the hosted todo service.
//!
//! `ApiClient` speaks the wire format of the auth and todo endpoints;
//! `TodoClient` performs todo CRUD through the session manager so every
//! call carries a valid bearer token.

pub mod client;
pub mod error;
pub mod todos;

pub use client::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
pub use todos::TodoClient;
