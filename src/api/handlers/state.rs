//! Shared handler state: the subsystem services plus portal-level settings.
//!
//! Everything in here is constructed once at startup from the CLI
//! configuration and injected via an `Extension`; nothing is re-read from the
//! environment afterwards.

use crate::directory::{admin::DirectoryAdmin, Directory};
use crate::email::EmailSender;
use crate::lock::ResetLock;
use crate::session::{SessionManager, SignedCookie};
use crate::token::TokenSigner;
use std::sync::Arc;

/// Portal-level settings that only the HTTP layer cares about.
#[derive(Clone, Debug)]
pub struct PortalConfig {
    base_url: String,
    spamcheck_url: Option<String>,
}

impl PortalConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            spamcheck_url: None,
        }
    }

    #[must_use]
    pub fn with_spamcheck_url(mut self, url: Option<String>) -> Self {
        self.spamcheck_url = url;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn spamcheck_url(&self) -> Option<&str> {
        self.spamcheck_url.as_deref()
    }

    /// Only mark cookies `Secure` when the portal itself is served over
    /// HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Link embedded in the forgot-password mail.
    #[must_use]
    pub fn reset_url(&self, token: &str) -> String {
        format!("{}/forgot-password/change?token={token}", self.base_url)
    }

    /// Link embedded in the account validation mail.
    #[must_use]
    pub fn activation_url(&self, token: &str) -> String {
        format!("{}/register/activate?token={token}", self.base_url)
    }
}

pub struct AppState {
    manager: SessionManager,
    admin: DirectoryAdmin,
    tokens: TokenSigner,
    lock: ResetLock,
    email: Arc<dyn EmailSender>,
    cookie: SignedCookie,
    directory: Arc<Directory>,
    portal: PortalConfig,
    http: reqwest::Client,
}

impl AppState {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: SessionManager,
        admin: DirectoryAdmin,
        tokens: TokenSigner,
        lock: ResetLock,
        email: Arc<dyn EmailSender>,
        cookie: SignedCookie,
        directory: Arc<Directory>,
        portal: PortalConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            manager,
            admin,
            tokens,
            lock,
            email,
            cookie,
            directory,
            portal,
            http,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    #[must_use]
    pub fn admin(&self) -> &DirectoryAdmin {
        &self.admin
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    #[must_use]
    pub fn lock(&self) -> &ResetLock {
        &self.lock
    }

    #[must_use]
    pub fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    #[must_use]
    pub fn cookie(&self) -> &SignedCookie {
        &self.cookie
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    #[must_use]
    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// Plain HTTP client for non-directory calls (the spam-check dispatch).
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::PortalConfig;

    #[test]
    fn portal_config_builds_links() {
        let portal = PortalConfig::new("https://accounts.example.test/".to_string());
        assert_eq!(portal.base_url(), "https://accounts.example.test");
        assert!(portal.cookie_secure());
        assert_eq!(
            portal.reset_url("abc"),
            "https://accounts.example.test/forgot-password/change?token=abc"
        );
        assert_eq!(
            portal.activation_url("xyz"),
            "https://accounts.example.test/register/activate?token=xyz"
        );
    }

    #[test]
    fn plain_http_portal_is_not_secure() {
        let portal = PortalConfig::new("http://localhost:8080".to_string());
        assert!(!portal.cookie_secure());
        assert!(portal.spamcheck_url().is_none());

        let portal = portal.with_spamcheck_url(Some("https://checker.test/scan".to_string()));
        assert_eq!(portal.spamcheck_url(), Some("https://checker.test/scan"));
    }
}
