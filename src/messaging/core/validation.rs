//! Input validation for user-facing fields.
//!
//! The HTTP layer never hands raw strings to the stores: every field goes
//! through one of these checks first and comes back normalised or as
//! [`TalkError::InvalidInput`].

use regex::Regex;

use crate::messaging::core::errors::{TalkError, TalkResult};

/// Maximum username length in characters.
pub const MAX_USERNAME_CHARS: usize = 150;
/// Maximum email length in characters.
pub const MAX_EMAIL_CHARS: usize = 254;
/// Maximum friends search keyword length in characters.
pub const MAX_KEYWORD_CHARS: usize = 150;

/// Compiled validators for user-facing fields.
#[derive(Clone, Debug)]
pub struct InputValidator {
    username: Regex,
    email: Regex,
}

impl InputValidator {
    /// Compile the validators.
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            username: Regex::new(r"^[\w.@+\-]+$")?,
            email: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$")?,
        })
    }

    /// Validate a username; returns the trimmed value.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the username is empty, too long, or uses
    /// characters outside letters, digits and `@ . + - _`.
    pub fn username(&self, raw: &str) -> TalkResult<String> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(TalkError::invalid_input("username", "must not be empty"));
        }
        let len = value.chars().count();
        if len > MAX_USERNAME_CHARS {
            return Err(TalkError::invalid_input(
                "username",
                format!("too long: got {len}, max {MAX_USERNAME_CHARS}"),
            ));
        }
        if !self.username.is_match(value) {
            return Err(TalkError::invalid_input(
                "username",
                "may only contain letters, digits and @/./+/-/_",
            ));
        }
        Ok(value.to_string())
    }

    /// Validate an email address; returns it trimmed with a lower-cased domain.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the address is empty, too long or malformed.
    pub fn email(&self, raw: &str) -> TalkResult<String> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(TalkError::invalid_input("email", "must not be empty"));
        }
        let len = value.chars().count();
        if len > MAX_EMAIL_CHARS {
            return Err(TalkError::invalid_input(
                "email",
                format!("too long: got {len}, max {MAX_EMAIL_CHARS}"),
            ));
        }
        if !self.email.is_match(value) {
            return Err(TalkError::invalid_input("email", "not a valid address"));
        }
        match value.rsplit_once('@') {
            Some((local, domain)) => Ok(format!("{local}@{}", domain.to_lowercase())),
            None => Err(TalkError::invalid_input("email", "not a valid address")),
        }
    }
}

/// Validate a message body against `max_chars`.
///
/// The body is stored as typed; only blank bodies are rejected.
///
/// # Errors
/// Returns `InvalidInput` if the body is blank or longer than `max_chars`.
pub fn validate_message_body(body: &str, max_chars: usize) -> TalkResult<()> {
    if body.trim().is_empty() {
        return Err(TalkError::invalid_input("body", "must not be empty"));
    }
    let len = body.chars().count();
    if len > max_chars {
        return Err(TalkError::invalid_input(
            "body",
            format!("too long: got {len}, max {max_chars}"),
        ));
    }
    Ok(())
}

/// Normalise a friends search keyword. Blank means "no filter".
///
/// # Errors
/// Returns `InvalidInput` if the keyword is longer than [`MAX_KEYWORD_CHARS`].
pub fn validate_keyword(raw: Option<&str>) -> TalkResult<Option<String>> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let len = value.chars().count();
    if len > MAX_KEYWORD_CHARS {
        return Err(TalkError::invalid_input(
            "keyword",
            format!("too long: got {len}, max {MAX_KEYWORD_CHARS}"),
        ));
    }
    Ok(Some(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> InputValidator {
        InputValidator::new().unwrap()
    }

    #[test]
    fn test_username_rules() {
        let v = validator();
        assert_eq!(v.username("  alice ").unwrap(), "alice");
        assert_eq!(v.username("a.b+c-d_e@f").unwrap(), "a.b+c-d_e@f");
        assert_eq!(v.username("山田太郎").unwrap(), "山田太郎");
        assert!(v.username("").is_err());
        assert!(v.username("has space").is_err());
        assert!(v.username(&"x".repeat(MAX_USERNAME_CHARS + 1)).is_err());
    }

    #[test]
    fn test_email_rules() {
        let v = validator();
        assert_eq!(
            v.email(" Bob@Example.COM ").unwrap(),
            "Bob@example.com"
        );
        assert!(v.email("bob").is_err());
        assert!(v.email("bob@localhost").is_err());
        assert!(v.email("a@@b.com").is_err());
        assert!(matches!(
            v.email(""),
            Err(TalkError::InvalidInput { field: "email", .. })
        ));
    }

    #[test]
    fn test_message_body_rules() {
        assert!(validate_message_body("hi", 10).is_ok());
        assert!(validate_message_body("   ", 10).is_err());
        assert!(validate_message_body("0123456789!", 10).is_err());
        assert!(validate_message_body("ありがとう", 5).is_ok());
    }

    #[test]
    fn test_keyword_normalisation() {
        assert_eq!(validate_keyword(None).unwrap(), None);
        assert_eq!(validate_keyword(Some("   ")).unwrap(), None);
        assert_eq!(validate_keyword(Some(" ali ")).unwrap(), Some("ali".to_string()));
        assert!(validate_keyword(Some(&"k".repeat(MAX_KEYWORD_CHARS + 1))).is_err());
    }
}
