//! Bridge between directory authentication and the client session record.
//!
//! Login picks a replica, authenticates, seals the issued artifact, and
//! writes the three-field record. Resumption reverses the seal, rebinds to
//! the recorded replica, and replays a liveness probe — an artifact is only
//! valid on the replica that issued it. A record that is present but cannot
//! be unsealed is a propagated error, not an anonymous visitor: it means key
//! rotation or tampering and the caller decides how loudly to react.

use super::codec::{CodecError, SessionCodec};
use super::store::{self, SessionStore, SERVER_KEY, SESSION_KEY, USERNAME_KEY};
use crate::directory::{Directory, DirectoryClient, DirectoryError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to seal session artifact")]
    Seal(#[source] CodecError),
    #[error("stored session is present but unreadable")]
    Corrupt(#[source] CodecError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub struct SessionManager {
    directory: Arc<Directory>,
    codec: SessionCodec,
}

impl SessionManager {
    #[must_use]
    pub fn new(directory: Arc<Directory>, codec: SessionCodec) -> Self {
        Self { directory, codec }
    }

    /// Authenticate against one randomly chosen replica and populate the
    /// session record. No retry on another replica: a wrong password is wrong
    /// everywhere, and retrying would multiply guesses.
    ///
    /// # Errors
    /// `Directory(PasswordExpired)` and `Directory(Unauthorized)` are
    /// distinguishable so callers can redirect to remediation or show the
    /// credential message; `Seal` covers the (startup-checked) key being
    /// unusable.
    pub async fn login(
        &self,
        store: &mut dyn SessionStore,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<DirectoryClient, SessionError> {
        let mut client = self.directory.connect_any()?;
        client.login(username, password, otp).await?;

        let artifact = client
            .session()
            .ok_or_else(|| {
                SessionError::Directory(DirectoryError::Unexpected {
                    code: None,
                    message: "login succeeded without a session artifact".to_string(),
                })
            })?
            .to_string();
        let sealed = self
            .codec
            .seal(artifact.as_bytes())
            .map_err(SessionError::Seal)?;

        store.insert(SESSION_KEY, sealed);
        store.insert(SERVER_KEY, client.hostname().to_string());
        store.insert(USERNAME_KEY, username.to_string());

        Ok(client)
    }

    /// Rebuild a live handle from the session record.
    ///
    /// Returns `Ok(None)` for an anonymous visitor (either of the sealed
    /// artifact or the server hostname missing) and for a session the
    /// directory no longer accepts. Returns `Err(Corrupt)` for a record that
    /// is present but does not unseal; callers log that, clear the record,
    /// and continue anonymously.
    ///
    /// # Errors
    /// `Corrupt` as above; probe failures other than "unauthorized"
    /// propagate as `Directory` errors.
    pub async fn resume(
        &self,
        store: &dyn SessionStore,
    ) -> Result<Option<DirectoryClient>, SessionError> {
        let (Some(sealed), Some(hostname)) = (store.get(SESSION_KEY), store.get(SERVER_KEY)) else {
            return Ok(None);
        };

        let artifact_bytes = self.codec.unseal(&sealed).map_err(SessionError::Corrupt)?;
        let artifact = String::from_utf8(artifact_bytes)
            .map_err(|_| SessionError::Corrupt(CodecError::Malformed))?;

        let mut client = self.directory.connect_to(&hostname);
        client.set_session(artifact);

        match client.ping().await {
            Ok(_) => Ok(Some(client)),
            Err(DirectoryError::Unauthorized(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Invalidate the backend session (best effort, idempotent) and clear the
    /// session record. The record is cleared even when the backend call
    /// fails; a dead handle must never keep a user logged in client-side.
    pub async fn logout(&self, store: &mut dyn SessionStore, client: &mut DirectoryClient) {
        if let Err(err) = client.logout().await {
            debug!("backend logout failed, clearing session anyway: {err}");
        }
        store::clear_session(store);
    }

    /// Logout straight from the stored record, without a liveness probe.
    /// Used by the logout endpoint, where "the record was already unusable"
    /// and "the backend refused" both still mean: clear the record.
    pub async fn logout_stored(&self, store: &mut dyn SessionStore) {
        if let (Some(sealed), Some(hostname)) = (store.get(SESSION_KEY), store.get(SERVER_KEY)) {
            if let Ok(artifact) = self
                .codec
                .unseal(&sealed)
                .map_err(SessionError::Corrupt)
                .and_then(|bytes| {
                    String::from_utf8(bytes)
                        .map_err(|_| SessionError::Corrupt(CodecError::Malformed))
                })
            {
                let mut client = self.directory.connect_to(&hostname);
                client.set_session(artifact);
                if let Err(err) = client.logout().await {
                    debug!("backend logout failed, clearing session anyway: {err}");
                }
            }
        }
        store::clear_session(store);
    }

    /// The recorded username, for greetings and redirects only. May lag the
    /// authenticated state; never use it for authorization.
    #[must_use]
    pub fn stored_username(store: &dyn SessionStore) -> Option<String> {
        store.get(USERNAME_KEY)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}
