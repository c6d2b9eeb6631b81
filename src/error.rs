// MIT License - Copyright (c) 2026 Peter Wright

use std::fmt;

use crate::dialect::Page;

/// Error codes embedded in the panel's error page, e.g. "(0x0902)".
///
/// The panel never uses HTTP status codes for these; it serves a 200 error
/// page whose body carries one of these markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelErrorCode {
    /// (0x0B00) - Wrong authentication code
    WrongCode,
    /// (0x0904) - Maximum login attempts reached, panel is locked out
    MaxLoginAttempts,
    /// (0x0812) - Wrong username or password
    WrongCredentials,
    /// (0x0902) - Another session is already authenticated
    SessionAlreadyOpen,
    /// (0x0903) - Request requires an authenticated session
    NotAuthorized,
    /// (0x1003) - Panel rejected a form parameter
    UnknownParameter,
}

impl PanelErrorCode {
    /// Parse an error code string scraped from the error page.
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "(0x0B00)" => Some(Self::WrongCode),
            "(0x0904)" => Some(Self::MaxLoginAttempts),
            "(0x0812)" => Some(Self::WrongCredentials),
            "(0x0902)" => Some(Self::SessionAlreadyOpen),
            "(0x0903)" => Some(Self::NotAuthorized),
            "(0x1003)" => Some(Self::UnknownParameter),
            _ => None,
        }
    }

    /// The wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongCode => "(0x0B00)",
            Self::MaxLoginAttempts => "(0x0904)",
            Self::WrongCredentials => "(0x0812)",
            Self::SessionAlreadyOpen => "(0x0902)",
            Self::NotAuthorized => "(0x0903)",
            Self::UnknownParameter => "(0x1003)",
        }
    }

    /// Human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::WrongCode => "Wrong code",
            Self::MaxLoginAttempts => "Max login attempt count reached",
            Self::WrongCredentials => "Wrong credentials",
            Self::SessionAlreadyOpen => "Session already open",
            Self::NotAuthorized => "Not authorized",
            Self::UnknownParameter => "Unknown parameter",
        }
    }
}

impl fmt::Display for PanelErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.description())
    }
}

/// All errors that can occur while talking to a Protexial panel.
#[derive(Debug, thiserror::Error)]
pub enum ProtexialError {
    #[error("request to {path} timed out")]
    Timeout { path: String },

    #[error("transport error on {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http error ({status}) on {path}")]
    Http { status: u16, path: String },

    #[error("login failed: wrong credentials")]
    WrongCredentials,

    #[error("login failed: max attempt count reached")]
    MaxLoginAttempts,

    #[error("login failed: wrong code")]
    WrongCode,

    #[error("panel rejected an unknown parameter")]
    UnknownParameter,

    #[error("too many login retries")]
    TooManyLoginRetries,

    #[error("challenge element not found on login page")]
    ChallengeNotFound,

    #[error("no code for challenge {challenge} in the challenge card")]
    CodeNotFound { challenge: String },

    #[error("unknown panel error ({code})")]
    UnknownPanelError { code: String, body: String },

    #[error("panel type not detected")]
    PanelNotDetected,

    #[error("panel is redirecting, try again later")]
    TryLater,

    #[error("page {0:?} is not available on this panel")]
    PageUnavailable(Page),

    #[error("malformed status document: {0}")]
    InvalidStatus(String),

    #[error("invalid selector {selector}: {details}")]
    Selector { selector: String, details: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProtexialError {
    /// Whether this error is transient and the caller should keep the last
    /// known status instead of failing.
    ///
    /// Only timeouts qualify; every other failure either needs operator
    /// attention (credentials, card mismatch) or indicates firmware drift.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtexialError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProtexialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in [
            PanelErrorCode::WrongCode,
            PanelErrorCode::MaxLoginAttempts,
            PanelErrorCode::WrongCredentials,
            PanelErrorCode::SessionAlreadyOpen,
            PanelErrorCode::NotAuthorized,
            PanelErrorCode::UnknownParameter,
        ] {
            assert_eq!(PanelErrorCode::from_code(code.as_str()), Some(code));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(PanelErrorCode::from_code("(0xFFFF)"), None);
        assert_eq!(PanelErrorCode::from_code(""), None);
    }

    #[test]
    fn test_code_with_whitespace() {
        assert_eq!(
            PanelErrorCode::from_code(" (0x0902) "),
            Some(PanelErrorCode::SessionAlreadyOpen)
        );
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(ProtexialError::Timeout { path: "/status.xml".into() }.is_retryable());
        assert!(!ProtexialError::WrongCredentials.is_retryable());
        assert!(!ProtexialError::TooManyLoginRetries.is_retryable());
        assert!(!ProtexialError::Http { status: 500, path: "/".into() }.is_retryable());
    }
}
