//! Request/response types for the portal endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub username: String,
    pub server: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordChangeRequest {
    pub username: String,
    pub current_password: String,
    pub new_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub mail: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SpamCheckRequest {
    pub token: String,
    /// `active` to proceed with validation, `spam` to drop the registration.
    pub verdict: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateRequest {
    pub token: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Password flows report whether the password ended up expired (policy
/// fallout) so clients can route the user to a change-after-login.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordOutcomeResponse {
    pub message: String,
    pub password_expired: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
    /// Stable machine-readable discriminator, e.g. `password_expired`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Form field the message belongs to, when it maps to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            field: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// The generic server-fault message. The underlying error is logged with
    /// context; raw backend text never reaches the user from here.
    #[must_use]
    pub fn server_error() -> Self {
        Self::new("Could not complete the request, please try again later")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn error_response_skips_empty_fields() {
        let value = serde_json::to_value(ErrorResponse::new("nope")).unwrap();
        assert_eq!(value.get("message").unwrap(), "nope");
        assert!(value.get("code").is_none());
        assert!(value.get("field").is_none());

        let value = serde_json::to_value(
            ErrorResponse::new("expired")
                .with_code("password_expired")
                .with_field("password"),
        )
        .unwrap();
        assert_eq!(value.get("code").unwrap(), "password_expired");
        assert_eq!(value.get("field").unwrap(), "password");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn login_request_otp_is_optional() {
        let request: LoginRequest =
            serde_json::from_value(serde_json::json!({"username": "alice", "password": "secret"}))
                .unwrap();
        assert_eq!(request.username, "alice");
        assert!(request.otp.is_none());
    }
}
