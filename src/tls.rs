//! Outbound TLS trust material for the directory connection.
//!
//! The directory replicas usually present certificates from a private CA, so
//! the shared HTTP client is built once at startup with that bundle pinned.
//! A missing or unreadable bundle stops the process; degrading to an
//! unverified connection is only possible through the explicit insecure
//! setting (meant for development instances).

use anyhow::{Context, Result};
use reqwest::Certificate;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::APP_USER_AGENT;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Load a PEM CA bundle for the outbound HTTPS client.
///
/// # Errors
/// Returns an error if the bundle cannot be read or parsed.
pub fn load_ca(path: &Path) -> Result<Certificate> {
    let pem = fs::read(path)
        .with_context(|| format!("Failed to read directory CA bundle: {}", path.display()))?;
    Certificate::from_pem(&pem).context("Failed to parse directory CA bundle")
}

/// Build the HTTP client used for every directory call.
///
/// # Errors
/// Returns an error if the CA bundle is configured but unusable, or the
/// client cannot be constructed.
pub fn http_client(ca_cert: Option<&Path>, accept_invalid_certs: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT);

    if let Some(path) = ca_cert {
        builder = builder.add_root_certificate(load_ca(path)?);
    }
    if accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .context("Failed to build directory HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn missing_path() -> PathBuf {
        std::env::temp_dir().join(format!("sportello-tls-test-{}", Uuid::new_v4()))
    }

    #[test]
    fn load_ca_missing_fails() {
        assert!(load_ca(&missing_path()).is_err());
    }

    #[test]
    fn http_client_builds_without_ca() {
        assert!(http_client(None, false).is_ok());
        assert!(http_client(None, true).is_ok());
    }

    #[test]
    fn http_client_fails_closed_on_bad_ca() {
        assert!(http_client(Some(&missing_path()), false).is_err());
    }
}
