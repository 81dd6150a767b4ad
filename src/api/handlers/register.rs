//! Registration: stage the account, clear the spam check, validate the mail
//! address, then activate with a chosen password.
//!
//! Each hop between the steps happens out-of-band (checker callback, mail
//! link), so each hop carries its own audience-scoped token. The stage
//! account itself is the single-use guard: once activated (or deleted), the
//! remaining tokens for it stop working.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use regex::Regex;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::password::set_and_unexpire_password;
use super::state::AppState;
use super::types::{
    ActivateRequest, ErrorResponse, MessageResponse, PasswordOutcomeResponse, RegisterRequest,
    SpamCheckRequest,
};
use crate::directory::{DirectoryError, NewStageUser};
use crate::email;
use crate::token::{self, Audience, TokenClaims};

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Account staged; validation pending", body = MessageResponse),
        (status = 400, description = "Invalid attributes", body = ErrorResponse),
        (status = 409, description = "Username already taken", body = ErrorResponse),
        (status = 503, description = "Mail could not be sent", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !valid_email(&request.mail) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email address").with_field("mail")),
        )
            .into_response();
    }

    let stage_user = NewStageUser {
        username: request.username.clone(),
        first_name: request.first_name,
        last_name: request.last_name,
        mail: request.mail.clone(),
    };
    match state.admin().stageuser_add(&stage_user).await {
        Ok(()) => {}
        Err(DirectoryError::DuplicateEntry(message)) => {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse::new(message).with_field("username")),
            )
                .into_response();
        }
        Err(DirectoryError::Validation { field, message }) => {
            let mut response = ErrorResponse::new(message);
            if let Some(field) = field {
                response = response.with_field(field);
            }
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
        Err(err) => {
            error!(
                "An unhandled error happened while registering user {}: {err}",
                request.username
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "An error occurred while creating the account, please try again",
                )),
            )
                .into_response();
        }
    }
    info!("{} registered and is awaiting validation", request.username);

    // With a checker configured the account waits for its verdict; without
    // one it goes straight to mail validation.
    if let Some(checker_url) = state.portal().spamcheck_url() {
        dispatch_spam_check(&state, checker_url, &request.username, &request.mail).await;
        (
            StatusCode::ACCEPTED,
            Json(MessageResponse::new(
                "Your account has been created and is being reviewed; you will receive \
                 a validation email shortly",
            )),
        )
            .into_response()
    } else {
        match send_validation_email(&state, &request.username, &request.mail) {
            Ok(()) => (
                StatusCode::ACCEPTED,
                Json(MessageResponse::new(
                    "Your account has been created, please check your email to validate it",
                )),
            )
                .into_response(),
            Err(response) => response,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/register/spam-check",
    request_body = SpamCheckRequest,
    responses(
        (status = 204, description = "Verdict applied"),
        (status = 400, description = "Invalid token or verdict", body = ErrorResponse),
        (status = 503, description = "Mail could not be sent", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn spam_check(
    state: Extension<Arc<AppState>>,
    Json(request): Json<SpamCheckRequest>,
) -> impl IntoResponse {
    let Some((username, mail)) = read_registration_token(&state, &request.token, Audience::SpamCheck)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid spam-check token").with_code("token_rejected")),
        )
            .into_response();
    };

    match request.verdict.as_str() {
        "active" => match send_validation_email(&state, &username, &mail) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(response) => response,
        },
        "spam" => {
            info!("{username} was flagged as spam, dropping the staged account");
            match state.admin().stageuser_del(&username).await {
                // Already gone is as good as deleted.
                Ok(()) | Err(DirectoryError::NotFound(_)) => {
                    StatusCode::NO_CONTENT.into_response()
                }
                Err(err) => {
                    error!("could not delete staged account {username}: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::server_error()),
                    )
                        .into_response()
                }
            }
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("Unknown verdict: {other}")).with_field("verdict")),
        )
            .into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/register/activate",
    request_body = ActivateRequest,
    responses(
        (status = 200, description = "Account activated", body = PasswordOutcomeResponse),
        (status = 400, description = "Invalid or expired token, or no pending registration", body = ErrorResponse),
        (status = 500, description = "Directory unavailable", body = ErrorResponse)
    ),
    tag = "register"
)]
pub async fn activate(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ActivateRequest>,
) -> impl IntoResponse {
    let claims = match state.tokens().read(&request.token, Audience::EmailValidation) {
        Ok(claims) => claims,
        Err(err) if err.is_expired() => {
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    ErrorResponse::new(
                        "The validation link has expired, please register again",
                    )
                    .with_code("token_rejected"),
                ),
            )
                .into_response();
        }
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    ErrorResponse::new("The validation link is invalid")
                        .with_code("token_rejected"),
                ),
            )
                .into_response();
        }
    };
    let Some(username) = claims.sub().map(ToString::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("The validation link is invalid").with_code("token_rejected")),
        )
            .into_response();
    };

    match state.admin().stageuser_activate(&username).await {
        Ok(()) => {
            // A policy with no minimum lifetime lets the user change the
            // forced password right away instead of waiting a day.
            match state.admin().pwpolicy_add(&username, 0, 8, 10).await {
                Ok(()) | Err(DirectoryError::DuplicateEntry(_)) => {}
                Err(err) => warn!("could not create a password policy for {username}: {err}"),
            }
        }
        Err(DirectoryError::NotFound(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "There is no pending registration for this link",
                )),
            )
                .into_response();
        }
        Err(err) => {
            error!("could not activate staged account {username}: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response();
        }
    }

    match set_and_unexpire_password(&state, &username, &request.password).await {
        Ok(()) => {
            info!("{username} activated their account");
            (
                StatusCode::OK,
                Json(PasswordOutcomeResponse {
                    message: "Congratulations, you now have an account! Go ahead and sign in \
                              to proceed"
                        .to_string(),
                    password_expired: false,
                }),
            )
                .into_response()
        }
        Err(DirectoryError::Policy(policy)) => (
            StatusCode::OK,
            Json(PasswordOutcomeResponse {
                message: format!(
                    "Your account has been created, but the password you chose does not \
                     comply with the policy ({policy}) and has thus been set as expired. \
                     You will be asked to change it after logging in"
                ),
                password_expired: true,
            }),
        )
            .into_response(),
        Err(err) => {
            // The account exists; registering again would collide. Send them
            // to login with an expired password instead of failing hard.
            error!(
                "An unhandled error happened while changing initial password for user \
                 {username}: {err}"
            );
            (
                StatusCode::OK,
                Json(PasswordOutcomeResponse {
                    message: "Your account has been created, but an error occurred while \
                              setting your password. You may need to change it after \
                              logging in"
                        .to_string(),
                    password_expired: true,
                }),
            )
                .into_response()
        }
    }
}

/// Decode a registration token (spam-check or validation) into its subject
/// and mail claims.
fn read_registration_token(
    state: &AppState,
    token: &str,
    audience: Audience,
) -> Option<(String, String)> {
    let claims: TokenClaims = match state.tokens().read(token, audience) {
        Ok(claims) => claims,
        Err(err) => {
            warn!("rejected {} token: {err}", audience.as_str());
            return None;
        }
    };
    let username = claims.sub()?.to_string();
    let mail = claims.get_str("mail")?.to_string();
    Some((username, mail))
}

/// Issue the validation token and mail its link.
fn send_validation_email(
    state: &AppState,
    username: &str,
    mail: &str,
) -> Result<(), axum::response::Response> {
    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!(username));
    claims.insert("mail".to_string(), json!(mail));
    let token = state
        .tokens()
        .issue(claims, Audience::EmailValidation, None)
        .map_err(|err: token::Error| {
            error!("could not issue a validation token for {username}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response()
        })?;

    let message =
        email::account_validation_message(mail, username, &state.portal().activation_url(&token));
    state.email().send(&message).map_err(|err| {
        error!("Impossible to send a validation email to {username}: {err}");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "We could not send you an email, please retry later",
            )),
        )
            .into_response()
    })
}

/// Hand the staged registration to the configured checker. Best effort: the
/// staged account stays either way, and the checker can be re-run.
async fn dispatch_spam_check(state: &AppState, checker_url: &str, username: &str, mail: &str) {
    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!(username));
    claims.insert("mail".to_string(), json!(mail));
    let token = match state.tokens().issue(claims, Audience::SpamCheck, None) {
        Ok(token) => token,
        Err(err) => {
            error!("could not issue a spam-check token for {username}: {err}");
            return;
        }
    };

    let result = state
        .http()
        .post(checker_url)
        .json(&json!({ "token": token }))
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            error!(
                "spam checker answered HTTP {} for {username}",
                response.status()
            );
        }
        Err(err) => error!("could not reach the spam checker for {username}: {err}"),
    }
}

/// Basic shape check; the directory does the authoritative validation.
fn valid_email(mail: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(mail))
}

#[cfg(test)]
mod tests {
    use super::valid_email;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("alice@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }
}
