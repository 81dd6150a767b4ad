//! Privileged directory operations under a fixed administrative identity.
//!
//! End users cannot stage accounts, force passwords, or delete entries on
//! their own behalf, so those operations run under a dedicated identity. Each
//! call opens a fresh session on a random replica, performs exactly one
//! operation, and logs out — nothing privileged is cached or reused, so a
//! leaked or stale privileged session cannot outlive the call that made it.

use super::{Directory, DirectoryClient, DirectoryError, DirectoryUser, NewStageUser};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::warn;

/// The finite set of operations the portal performs with elevated rights.
/// Every operation is an explicit method with a typed signature; there is no
/// string-keyed pass-through to the backend.
pub struct DirectoryAdmin {
    directory: Arc<Directory>,
    username: String,
    password: SecretString,
}

impl DirectoryAdmin {
    #[must_use]
    pub fn new(directory: Arc<Directory>, username: String, password: SecretString) -> Self {
        Self {
            directory,
            username,
            password,
        }
    }

    /// Look up an account.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn user_show(&self, username: &str) -> Result<DirectoryUser, DirectoryError> {
        let mut session = self.open().await?;
        let result = session.user_show(username).await;
        Self::close(&mut session).await;
        result
    }

    /// Force an account's password. The directory marks it expired; the
    /// calling flow un-expires it as the user afterwards.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn user_set_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session.user_set_password(username, password).await;
        Self::close(&mut session).await;
        result
    }

    /// Delete an account.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn user_del(&self, username: &str) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session.user_del(username).await;
        Self::close(&mut session).await;
        result
    }

    /// Stage a new account awaiting activation.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn stageuser_add(&self, user: &NewStageUser) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session.stageuser_add(user).await;
        Self::close(&mut session).await;
        result
    }

    /// Remove a staged account.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn stageuser_del(&self, username: &str) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session.stageuser_del(username).await;
        Self::close(&mut session).await;
        result
    }

    /// Activate a staged account.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn stageuser_activate(&self, username: &str) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session.stageuser_activate(username).await;
        Self::close(&mut session).await;
        result
    }

    /// Create a password policy for a group.
    ///
    /// # Errors
    /// Privileged login failures and RPC errors propagate.
    pub async fn pwpolicy_add(
        &self,
        group: &str,
        min_lifetime: u32,
        min_length: u32,
        priority: u32,
    ) -> Result<(), DirectoryError> {
        let mut session = self.open().await?;
        let result = session
            .pwpolicy_add(group, min_lifetime, min_length, priority)
            .await;
        Self::close(&mut session).await;
        result
    }

    /// Open a fresh privileged session: random replica, login, liveness
    /// probe. There is no fallback identity; any failure here is fatal to the
    /// calling operation.
    async fn open(&self) -> Result<DirectoryClient, DirectoryError> {
        let mut client = self.directory.connect_any()?;
        client
            .login(&self.username, self.password.expose_secret(), None)
            .await?;
        client.ping().await?;
        Ok(client)
    }

    /// Close a privileged session. Runs on both the success and the failure
    /// path of the wrapped operation; a failed logout leaves only a
    /// server-side session that will expire, so it is logged, not raised.
    async fn close(session: &mut DirectoryClient) {
        if let Err(err) = session.logout().await {
            warn!("failed to log out privileged session: {err}");
        }
    }
}

impl std::fmt::Debug for DirectoryAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryAdmin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryConfig;

    #[tokio::test]
    async fn operations_fail_fast_without_servers() {
        let directory =
            Arc::new(Directory::new(DirectoryConfig::default()).expect("client builds"));
        let admin = DirectoryAdmin::new(
            directory,
            "admin".to_string(),
            SecretString::from("secret"),
        );

        assert!(matches!(
            admin.user_show("alice").await,
            Err(DirectoryError::NoServers)
        ));
        assert!(matches!(
            admin.user_del("alice").await,
            Err(DirectoryError::NoServers)
        ));
    }

    #[test]
    fn debug_hides_credentials() {
        let directory =
            Arc::new(Directory::new(DirectoryConfig::default()).expect("client builds"));
        let admin = DirectoryAdmin::new(
            directory,
            "admin".to_string(),
            SecretString::from("super-secret"),
        );
        let rendered = format!("{admin:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("super-secret"));
    }
}
