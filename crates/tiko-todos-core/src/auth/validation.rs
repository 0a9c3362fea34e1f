use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::ValidationError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The account service rejects longer first/last names
pub const MAX_NAME_LENGTH: usize = 150;

/// Sign-up form contents. Serializes to the exact `register/` body.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationProfile {
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegistrationProfile {
    /// Check the profile locally, in the order the sign-up form reports problems.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.password != self.password2 {
            return Err(ValidationError::PasswordMismatch);
        }
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LENGTH });
        }
        if self.first_name.chars().count() > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong { field: "First name", max: MAX_NAME_LENGTH });
        }
        if self.last_name.chars().count() > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong { field: "Last name", max: MAX_NAME_LENGTH });
        }
        Ok(())
    }

    /// Copy of the profile as it is sent on the wire (email lowercased)
    pub(crate) fn normalized(&self) -> Self {
        Self {
            email: self.email.to_lowercase(),
            ..self.clone()
        }
    }
}

/// `local@domain.tld` as the sign-up form accepts it: no whitespace, one
/// `@`, and a dot somewhere after the first character of the domain.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}
