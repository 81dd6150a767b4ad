//! Typed errors for the directory wire protocol.
//!
//! The callers care about four families: credential problems (expected,
//! user-facing), expired credentials (redirect to remediation), policy text
//! (user-safe, passed through verbatim), and everything else (logged,
//! surfaced generically). The enum keeps those distinguishable.

use regex::Regex;
use thiserror::Error;

/// JSON-RPC error code for "entry not found".
const RPC_NOT_FOUND: i64 = 4001;
/// JSON-RPC error code for "entry already exists".
const RPC_DUPLICATE_ENTRY: i64 = 4002;
/// JSON-RPC error code for "invalid value".
const RPC_VALIDATION: i64 = 3009;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("password expired")]
    PasswordExpired,
    #[error("the current password or username is not correct")]
    InvalidPassword,
    /// Policy text comes from the server and is already user-safe.
    #[error("{0}")]
    Policy(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    DuplicateEntry(String),
    #[error("{message}")]
    Validation {
        /// Form-field identifier the message maps to, when recognizable.
        field: Option<String>,
        message: String,
    },
    #[error("no directory servers configured")]
    NoServers,
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected directory error: {message}")]
    Unexpected { code: Option<i64>, message: String },
}

impl DirectoryError {
    /// Credential-class errors are expected and user-facing; they are never
    /// logged at server-error severity.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::PasswordExpired | Self::InvalidPassword
        )
    }
}

/// Map a JSON-RPC error object to a typed error.
#[must_use]
pub fn map_rpc_error(code: Option<i64>, message: &str) -> DirectoryError {
    match code {
        Some(RPC_NOT_FOUND) => DirectoryError::NotFound(message.to_string()),
        Some(RPC_DUPLICATE_ENTRY) => DirectoryError::DuplicateEntry(message.to_string()),
        Some(RPC_VALIDATION) => {
            let field = validation_field(message);
            DirectoryError::Validation {
                field,
                message: message.to_string(),
            }
        }
        _ => DirectoryError::Unexpected {
            code,
            message: message.to_string(),
        },
    }
}

/// Map a 401 rejection-reason header from the login endpoint.
#[must_use]
pub fn map_rejection_reason(reason: Option<&str>) -> DirectoryError {
    match reason {
        Some("password-expired") => DirectoryError::PasswordExpired,
        Some("invalid-password") => {
            DirectoryError::Unauthorized("The password or username you entered is incorrect".into())
        }
        Some("denied") => DirectoryError::Unauthorized("Access denied".into()),
        Some(other) => DirectoryError::Unauthorized(format!("Login rejected: {other}")),
        None => DirectoryError::Unauthorized("Login failed".into()),
    }
}

/// Server validation messages look like `invalid 'login': reason`. The quoted
/// name is the server's CLI name for the attribute, which differs from the
/// portal's form-field names; translate the ones we present to users.
fn validation_field(message: &str) -> Option<String> {
    let regex = Regex::new(r"^invalid '([^']+)': ").ok()?;
    let captured = regex.captures(message)?.get(1)?.as_str();
    let field = match captured {
        "login" => "username",
        "first" => "first_name",
        "last" => "last_name",
        "password" => "password",
        "email" => "mail",
        _ => return None,
    };
    Some(field.to_string())
}
