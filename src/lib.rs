//! # Sportello (Self-Service Account Portal)
//!
//! `sportello` is a self-service account management portal in front of a
//! FreeIPA-style directory. End users log in, change or reset their password,
//! and register accounts; the portal holds no user database of its own.
//!
//! ## Sessions
//!
//! The directory issues a bearer artifact at login. The portal encrypts it
//! (ChaCha20-Poly1305) and stores it, together with the issuing replica and
//! the username, in a signed client-side cookie. Every request unseals the
//! artifact and replays a liveness probe against the *same* replica —
//! artifacts are not portable across replicas.
//!
//! ## Out-of-band tokens
//!
//! Password reset, account validation, and the registration spam check each
//! hand a signed HS256 token to a party without a session. All three flows
//! share one signing key, so tokens carry a mandatory audience claim and
//! verification rejects a token presented to the wrong flow.
//!
//! ## Privileged operations
//!
//! Staging, activating, and deleting accounts and forcing passwords run
//! under a dedicated administrative identity. Each privileged call opens a
//! fresh directory session and closes it again; nothing privileged is cached.

pub mod api;
pub mod cli;
pub mod directory;
pub mod email;
pub mod lock;
pub mod session;
pub mod tls;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
