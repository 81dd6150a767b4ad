//! Password change and the two-step forgotten-password flow.
//!
//! The forgotten-password flow is the one place where the lock, the scoped
//! tokens, and the privileged session all meet:
//! ask: lock check → account lookup → reset token → mail → lock store.
//! change: token read → lock re-check → freshness check → forced password →
//! un-expire as the user → lock delete.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

use super::state::AppState;
use super::types::{
    ErrorResponse, ForgotPasswordRequest, MessageResponse, PasswordChangeRequest,
    PasswordOutcomeResponse, PasswordResetRequest,
};
use crate::directory::DirectoryError;
use crate::email;
use crate::token::{self, Audience};

#[utoipa::path(
    post,
    path = "/v1/password/change",
    request_body = PasswordChangeRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password or policy violation", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "password"
)]
pub async fn change(
    state: Extension<Arc<AppState>>,
    Json(request): Json<PasswordChangeRequest>,
) -> impl IntoResponse {
    // Password changes go through the dedicated endpoint, which authenticates
    // with the old password itself; no session is needed or used.
    let client = match state.directory().connect_any() {
        Ok(client) => client,
        Err(err) => {
            error!("no directory replica available for password change: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response();
        }
    };

    let result = client
        .change_password(
            &request.username,
            &request.new_password,
            &request.current_password,
            request.otp.as_deref(),
        )
        .await;

    match result {
        Ok(()) => {
            info!("Password for {} was changed", request.username);
            (
                StatusCode::OK,
                Json(MessageResponse::new("Your password has been changed")),
            )
                .into_response()
        }
        Err(DirectoryError::InvalidPassword) => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("The old password or username is not correct")
                    .with_field("current_password"),
            ),
        )
            .into_response(),
        Err(DirectoryError::Policy(policy)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(policy).with_field("new_password")),
        )
            .into_response(),
        Err(err) => {
            error!(
                "An unhandled error happened while changing the password for user {}: {err}",
                request.username
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Could not change password")),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset mail sent", body = MessageResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
        (status = 429, description = "A reset was already requested recently", body = ErrorResponse),
        (status = 503, description = "Mail could not be sent", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "password"
)]
pub async fn forgot(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> impl IntoResponse {
    let username = request.username;

    // Lock check first: one pending reset per user. Lock-state trouble is
    // never fatal; an unreadable marker just means "not locked".
    match state.lock().valid_until(&username) {
        Ok(Some(valid_until)) => {
            if let Ok(remaining) = valid_until.duration_since(SystemTime::now()) {
                let wait_min = remaining.as_secs() / 60;
                let wait_sec = remaining.as_secs() % 60;
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse::new(format!(
                        "You have already requested a password reset, you need to wait \
                         {wait_min} minute(s) and {wait_sec} seconds before you can \
                         request another"
                    ))),
                )
                    .into_response();
            }
        }
        Ok(None) => {}
        Err(err) => warn!("could not read reset lock for {username}: {err}"),
    }

    let user = match state.admin().user_show(&username).await {
        Ok(user) => user,
        Err(DirectoryError::NotFound(_)) => {
            return (
                StatusCode::NOT_FOUND,
                Json(
                    ErrorResponse::new(format!("User {username} does not exist"))
                        .with_field("username"),
                ),
            )
                .into_response();
        }
        Err(err) => {
            error!("could not look up {username} for a password reset: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response();
        }
    };

    let Some(mail) = user.mail().map(ToString::to_string) else {
        error!("{username} has no mail address on file, cannot send a reset token");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::server_error()),
        )
            .into_response();
    };

    // The token carries the last-password-change timestamp so it stops
    // working the moment the password changes by any other means.
    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!(username));
    claims.insert(
        "lpc".to_string(),
        json!(user.last_password_change().unwrap_or_default()),
    );
    let token = match state.tokens().issue(claims, Audience::PasswordReset, None) {
        Ok(token) => token,
        Err(err) => {
            error!("could not issue a reset token for {username}: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response();
        }
    };

    let message =
        email::password_reset_message(&mail, &username, &state.portal().reset_url(&token));
    if let Err(err) = state.email().send(&message) {
        error!("Impossible to send a password reset email: {err}");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "We could not send you an email, please retry later",
            )),
        )
            .into_response();
    }

    // Only lock once the mail is out; a failed send must not block retries.
    if let Err(err) = state.lock().store(&username) {
        warn!("could not store reset lock for {username}: {err}");
    }
    info!("{username} forgot their password and requested a token");

    (
        StatusCode::OK,
        Json(MessageResponse::new(
            "An email has been sent to your address with instructions on how to reset \
             your password",
        )),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/password/reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Password reset completed", body = PasswordOutcomeResponse),
        (status = 400, description = "Invalid, expired, or stale token", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "password"
)]
pub async fn reset(
    state: Extension<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> impl IntoResponse {
    let claims = match state.tokens().read(&request.token, Audience::PasswordReset) {
        Ok(claims) => claims,
        Err(err) if err.is_expired() => {
            return token_rejected("The token has expired, please request a new one");
        }
        Err(token::Error::WrongAudience { .. }) => {
            // A valid token for another flow; nothing a new reset request
            // would fix, so say so without inviting one.
            return token_rejected("The token is not valid for this operation");
        }
        Err(_) => {
            return token_rejected("The token is invalid, please request a new one");
        }
    };
    let Some(username) = claims.sub().map(ToString::to_string) else {
        return token_rejected("The token is invalid, please request a new one");
    };

    // The token itself never expires; the lock is its clock. No lock (or an
    // aged-out one) means the window has closed.
    let lock_valid = matches!(
        state.lock().valid_until(&username),
        Ok(Some(valid_until)) if valid_until > SystemTime::now()
    );
    if !lock_valid {
        delete_lock(state.lock(), &username);
        return token_rejected("The token has expired, please request a new one");
    }

    let user = match state.admin().user_show(&username).await {
        Ok(user) => user,
        Err(err) => {
            error!("could not look up {username} to complete a password reset: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response();
        }
    };
    let current = user.last_password_change().unwrap_or_default();
    if claims.get_str("lpc").unwrap_or_default() != current {
        delete_lock(state.lock(), &username);
        return token_rejected(
            "Your password has been changed since you requested this token, please \
             request a new one",
        );
    }

    match set_and_unexpire_password(&state, &username, &request.new_password).await {
        Ok(()) => {
            delete_lock(state.lock(), &username);
            info!(
                "Password for {username} was changed after completing the forgotten \
                 password process"
            );
            (
                StatusCode::OK,
                Json(PasswordOutcomeResponse {
                    message: "Your password has been changed".to_string(),
                    password_expired: false,
                }),
            )
                .into_response()
        }
        Err(DirectoryError::Policy(policy)) => {
            // The forced password took, but the follow-up change hit policy;
            // the account now has an expired password.
            delete_lock(state.lock(), &username);
            info!(
                "Password for {username} was changed to a non-compliant password after \
                 completing the forgotten password process"
            );
            (
                StatusCode::OK,
                Json(PasswordOutcomeResponse {
                    message: format!(
                        "Your password has been changed, but it does not comply with the \
                         policy ({policy}) and has thus been set as expired. You will be \
                         asked to change it after logging in"
                    ),
                    password_expired: true,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(
                "An unhandled error happened while resetting the password for user \
                 {username}: {err}"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Could not change password, please try again",
                )),
            )
                .into_response()
        }
    }
}

/// Force the password with privileged rights, then immediately change it as
/// the user so it is not marked expired. Shared by the reset and activation
/// flows.
pub(super) async fn set_and_unexpire_password(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<(), DirectoryError> {
    state.admin().user_set_password(username, password).await?;
    let client = state.directory().connect_any()?;
    client
        .change_password(username, password, password, None)
        .await
}

fn token_rejected(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message).with_code("token_rejected")),
    )
        .into_response()
}

fn delete_lock(lock: &crate::lock::ResetLock, username: &str) {
    if let Err(err) = lock.delete(username) {
        warn!("could not delete reset lock for {username}: {err}");
    }
}
