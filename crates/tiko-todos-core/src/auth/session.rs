use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    Refreshing,
    Expired,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "Not logged in",
            SessionStatus::Authenticated => "Logged in",
            SessionStatus::Refreshing => "Refreshing session",
            SessionStatus::Expired => "Session expired",
        }
    }
}

/// Access and refresh token, always held together.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Authentication state of the current user.
#[derive(Debug, Clone)]
pub struct Session {
    tokens: Option<TokenPair>,
    status: SessionStatus,
    validated_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            tokens: None,
            status: SessionStatus::Unauthenticated,
            validated_at: None,
        }
    }

    /// Session for a pair just issued by the server
    pub fn authenticated(tokens: TokenPair) -> Self {
        Self {
            tokens: Some(tokens),
            status: SessionStatus::Authenticated,
            validated_at: Some(Utc::now()),
        }
    }

    /// Session for a pair loaded from storage; not trusted until verified
    pub fn restored(tokens: TokenPair) -> Self {
        Self {
            tokens: Some(tokens),
            status: SessionStatus::Authenticated,
            validated_at: None,
        }
    }

    pub fn expired() -> Self {
        Self {
            tokens: None,
            status: SessionStatus::Expired,
            validated_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh.as_str())
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Whether the access token was confirmed good less than `window` ago
    pub fn is_trusted(&self, window: Duration) -> bool {
        if window <= Duration::zero() {
            return false;
        }
        match self.validated_at {
            Some(at) => Utc::now() - at < window,
            None => false,
        }
    }

    pub(crate) fn mark_validated(&mut self) {
        self.validated_at = Some(Utc::now());
    }

    /// Forget the last verification so the next caller asks the server again
    pub(crate) fn clear_validation(&mut self) {
        self.validated_at = None;
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    /// Swap in a freshly minted access token, keeping the refresh token
    pub(crate) fn replace_access(&mut self, access: String) {
        if let Some(tokens) = self.tokens.as_mut() {
            tokens.access = access;
            self.status = SessionStatus::Authenticated;
            self.validated_at = Some(Utc::now());
        }
    }
}
