//! Process-wide configuration, read once at startup.
//!
//! Everything the subsystems need is collected here and passed by reference;
//! nothing re-reads the environment after boot. Key material and the
//! privileged credential are held as secrets so they stay out of debug
//! output.

use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Interchangeable directory replicas (hostnames).
    pub servers: Vec<String>,
    /// PEM CA bundle for the directory's TLS, if not publicly trusted.
    pub ca_cert: Option<PathBuf>,
    /// Skip TLS verification (development instances only).
    pub insecure: bool,
    /// Public base URL of this portal, used in mailed links.
    pub base_url: String,
    /// 32-byte base64url key encrypting the sealed session artifact.
    pub session_key: SecretString,
    /// Signing key for tokens and the portal cookie.
    pub secret_key: SecretString,
    /// Privileged directory identity.
    pub admin_user: String,
    pub admin_password: SecretString,
    /// Reset-lock marker directory and window.
    pub lock_dir: PathBuf,
    pub lock_expiration_minutes: u64,
    /// Default token lifetimes per flow.
    pub activation_expiration_minutes: i64,
    pub spamcheck_expiration_minutes: i64,
    /// Registration spam checker endpoint, if any.
    pub spamcheck_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let args = GlobalArgs {
            servers: vec!["ipa1.example.test".to_string()],
            ca_cert: None,
            insecure: false,
            base_url: "https://accounts.example.test".to_string(),
            session_key: SecretString::from("session-key-material"),
            secret_key: SecretString::from("signing-key-material"),
            admin_user: "admin".to_string(),
            admin_password: SecretString::from("admin-password"),
            lock_dir: PathBuf::from("/tmp/sportello-pw-reset"),
            lock_expiration_minutes: 10,
            activation_expiration_minutes: 30,
            spamcheck_expiration_minutes: 60,
            spamcheck_url: None,
        };

        let rendered = format!("{args:?}");
        assert!(rendered.contains("ipa1.example.test"));
        assert!(!rendered.contains("session-key-material"));
        assert!(!rendered.contains("admin-password"));
        assert_eq!(args.session_key.expose_secret(), "session-key-material");
    }
}
