//! OpenAPI document for the portal endpoints.

use crate::api::handlers::{auth, health, password, register, types};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::session,
        auth::logout,
        password::change,
        password::forgot,
        password::reset,
        register::register,
        register::spam_check,
        register::activate,
    ),
    components(schemas(
        health::Health,
        types::LoginRequest,
        types::SessionResponse,
        types::PasswordChangeRequest,
        types::ForgotPasswordRequest,
        types::PasswordResetRequest,
        types::RegisterRequest,
        types::SpamCheckRequest,
        types::ActivateRequest,
        types::MessageResponse,
        types::PasswordOutcomeResponse,
        types::ErrorResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Login, session, logout"),
        (name = "password", description = "Password change and reset"),
        (name = "register", description = "Account registration and activation")
    ),
    info(
        title = "sportello",
        description = "Self-service account management portal",
    )
)]
pub struct ApiDoc;

/// Serialized OpenAPI document, served under the docs route.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
