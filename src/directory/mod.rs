//! Client for the FreeIPA-style directory server.
//!
//! The directory exposes three surfaces we use: a form-encoded login endpoint
//! that answers with the `ipa_session` bearer cookie, a form-encoded password
//! change endpoint that reports its outcome in response headers, and a
//! JSON-RPC endpoint for everything else. Replicas are interchangeable except
//! that a session artifact is only valid on the replica that issued it.

pub mod admin;
pub mod error;

pub use error::DirectoryError;

use crate::tls;
use anyhow::Result;
use rand::seq::SliceRandom;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::instrument;

/// Name of the session cookie the directory issues at login.
const SESSION_COOKIE: &str = "ipa_session";

/// Header carrying the reason for a 401 on the login endpoint.
const REJECTION_REASON_HEADER: &str = "X-IPA-Rejection-Reason";

/// Headers carrying the outcome of a password change.
const PWCHANGE_RESULT_HEADER: &str = "X-IPA-Pwchange-Result";
const PWCHANGE_POLICY_HEADER: &str = "X-IPA-Pwchange-Policy-Error";

/// Connection settings for the directory: the replica set and the TLS trust
/// material for reaching it. Immutable after startup.
#[derive(Clone, Debug, Default)]
pub struct DirectoryConfig {
    pub servers: Vec<String>,
    pub ca_cert: Option<PathBuf>,
    pub accept_invalid_certs: bool,
}

/// Shared factory for clients bound to one replica of an interchangeable set.
#[derive(Clone, Debug)]
pub struct Directory {
    config: DirectoryConfig,
    http: reqwest::Client,
}

impl Directory {
    /// Build the factory, loading CA trust material once.
    ///
    /// # Errors
    /// Returns an error if the CA bundle cannot be read or the HTTP client
    /// cannot be constructed.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let http = tls::http_client(config.ca_cert.as_deref(), config.accept_invalid_certs)?;
        Ok(Self { config, http })
    }

    #[must_use]
    pub fn servers(&self) -> &[String] {
        &self.config.servers
    }

    /// A client bound to a uniformly random replica. Selection is stateless;
    /// replicas are equivalent for load-distribution purposes.
    ///
    /// # Errors
    /// Returns `DirectoryError::NoServers` when the replica list is empty.
    pub fn connect_any(&self) -> Result<DirectoryClient, DirectoryError> {
        let hostname = self
            .config
            .servers
            .choose(&mut rand::thread_rng())
            .ok_or(DirectoryError::NoServers)?;
        Ok(self.connect_to(hostname))
    }

    /// A client bound to a specific replica, e.g. the one recorded in a
    /// resumed session.
    #[must_use]
    pub fn connect_to(&self, hostname: &str) -> DirectoryClient {
        DirectoryClient {
            http: self.http.clone(),
            base_url: format!("https://{hostname}/ipa"),
            hostname: hostname.to_string(),
            session: None,
        }
    }
}

/// Fields for creating a staged (not yet active) account.
#[derive(Clone, Debug)]
pub struct NewStageUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub mail: String,
}

/// A connection to one directory replica, optionally carrying a session
/// artifact. The artifact is the raw bearer value; sealing it for cookie
/// storage is the session layer's business.
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    hostname: String,
    session: Option<String>,
}

impl DirectoryClient {
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The session artifact issued at login, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Inject a previously issued artifact, e.g. one unsealed from a cookie.
    /// Only meaningful on a client bound to the replica that issued it.
    pub fn set_session(&mut self, artifact: String) {
        self.session = Some(artifact);
    }

    /// Authenticate with username and password (OTP appended when provided,
    /// as the directory expects for OTP-enabled accounts). On success the
    /// session artifact is stored on the client.
    ///
    /// # Errors
    /// `PasswordExpired` and `Unauthorized` are distinguishable from
    /// transport and unexpected server errors.
    #[instrument(skip(self, password, otp), fields(server = %self.hostname))]
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<(), DirectoryError> {
        let mut secret = password.to_string();
        if let Some(otp) = otp {
            secret.push_str(otp);
        }

        let response = self
            .http
            .post(format!("{}/session/login_password", self.base_url))
            .header(REFERER, &self.base_url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .form(&[("user", username), ("password", &secret)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let reason = header_str(&response, REJECTION_REASON_HEADER);
            return Err(error::map_rejection_reason(reason.as_deref()));
        }
        if !status.is_success() {
            return Err(DirectoryError::Unexpected {
                code: None,
                message: format!("login returned HTTP {status}"),
            });
        }

        let artifact = session_cookie_value(&response).ok_or(DirectoryError::Unexpected {
            code: None,
            message: "login response carried no session cookie".to_string(),
        })?;
        self.session = Some(artifact);
        Ok(())
    }

    /// Cheap liveness probe for the current session. Returns the server's
    /// version summary.
    ///
    /// # Errors
    /// `Unauthorized` means the artifact is no longer valid on this replica;
    /// anything else is a real failure.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn ping(&self) -> Result<String, DirectoryError> {
        let result = self.rpc("ping", &[], json!({})).await?;
        Ok(result
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Invalidate the session server-side and drop the artifact. Calling
    /// without a session is a no-op.
    ///
    /// # Errors
    /// Propagates transport and server errors; callers on best-effort paths
    /// log and continue.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn logout(&mut self) -> Result<(), DirectoryError> {
        if self.session.is_none() {
            return Ok(());
        }
        let result = self.rpc("session_logout", &[], json!({})).await;
        self.session = None;
        result.map(|_| ())
    }

    /// Change a password through the dedicated endpoint. Works without a
    /// session, which is what the reset flows rely on.
    ///
    /// # Errors
    /// `InvalidPassword` when the old password is wrong, `Policy` carrying
    /// the server's user-safe policy text, `Unexpected` otherwise.
    #[instrument(skip(self, new_password, old_password, otp), fields(server = %self.hostname))]
    pub async fn change_password(
        &self,
        username: &str,
        new_password: &str,
        old_password: &str,
        otp: Option<&str>,
    ) -> Result<(), DirectoryError> {
        let mut form = vec![
            ("user", username),
            ("new_password", new_password),
            ("old_password", old_password),
        ];
        if let Some(otp) = otp {
            form.push(("otp", otp));
        }

        let response = self
            .http
            .post(format!("{}/session/change_password", self.base_url))
            .header(REFERER, &self.base_url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let result = header_str(&response, PWCHANGE_RESULT_HEADER);
        match result.as_deref() {
            Some("ok") => Ok(()),
            Some("invalid-password") => Err(DirectoryError::InvalidPassword),
            Some("policy-error") => {
                let policy = header_str(&response, PWCHANGE_POLICY_HEADER)
                    .unwrap_or_else(|| "Password does not comply with the policy".to_string());
                Err(DirectoryError::Policy(policy))
            }
            _ => Err(DirectoryError::Unexpected {
                code: None,
                message: format!("password change returned HTTP {status}"),
            }),
        }
    }

    /// Full attribute view of one account.
    ///
    /// # Errors
    /// `NotFound` when the account does not exist.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn user_show(&self, username: &str) -> Result<DirectoryUser, DirectoryError> {
        let result = self
            .rpc("user_show", &[username], json!({"all": true}))
            .await?;
        Ok(DirectoryUser::new(
            result.get("result").cloned().unwrap_or(Value::Null),
        ))
    }

    /// Set an account's password directly (administrative). The directory
    /// marks such passwords expired; callers un-expire them with a follow-up
    /// `change_password` as the user.
    ///
    /// # Errors
    /// Propagates typed RPC errors.
    #[instrument(skip(self, password), fields(server = %self.hostname))]
    pub async fn user_set_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        self.rpc("user_mod", &[username], json!({"userpassword": password}))
            .await
            .map(|_| ())
    }

    /// Delete an account.
    ///
    /// # Errors
    /// Propagates typed RPC errors.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn user_del(&self, username: &str) -> Result<(), DirectoryError> {
        self.rpc("user_del", &[username], json!({})).await.map(|_| ())
    }

    /// Create a staged account awaiting activation.
    ///
    /// # Errors
    /// `DuplicateEntry` when the username is taken, `Validation` for
    /// attribute errors.
    #[instrument(skip(self), fields(server = %self.hostname, username = %user.username))]
    pub async fn stageuser_add(&self, user: &NewStageUser) -> Result<(), DirectoryError> {
        let full_name = format!("{} {}", user.first_name, user.last_name);
        self.rpc(
            "stageuser_add",
            &[&user.username],
            json!({
                "givenname": user.first_name,
                "sn": user.last_name,
                "cn": full_name,
                "mail": user.mail,
                "loginshell": "/bin/bash",
            }),
        )
        .await
        .map(|_| ())
    }

    /// Delete a staged account (e.g. after a spam verdict).
    ///
    /// # Errors
    /// Propagates typed RPC errors.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn stageuser_del(&self, username: &str) -> Result<(), DirectoryError> {
        self.rpc("stageuser_del", &[username], json!({}))
            .await
            .map(|_| ())
    }

    /// Promote a staged account to an active one.
    ///
    /// # Errors
    /// `NotFound` when no staged account exists under that name.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn stageuser_activate(&self, username: &str) -> Result<(), DirectoryError> {
        self.rpc("stageuser_activate", &[username], json!({}))
            .await
            .map(|_| ())
    }

    /// Create a password policy for a group.
    ///
    /// # Errors
    /// Propagates typed RPC errors.
    #[instrument(skip(self), fields(server = %self.hostname))]
    pub async fn pwpolicy_add(
        &self,
        group: &str,
        min_lifetime: u32,
        min_length: u32,
        priority: u32,
    ) -> Result<(), DirectoryError> {
        self.rpc(
            "pwpolicy_add",
            &[group],
            json!({
                "krbminpwdlife": min_lifetime,
                "krbpwdminlength": min_length,
                "cospriority": priority,
            }),
        )
        .await
        .map(|_| ())
    }

    /// One JSON-RPC call. The envelope is `{"method", "params": [args,
    /// options], "id"}`; errors come back in-band as an `error` object.
    async fn rpc(
        &self,
        method: &str,
        args: &[&str],
        options: Value,
    ) -> Result<Value, DirectoryError> {
        let body = json!({
            "method": method,
            "params": [args, options],
            "id": 0,
        });

        let mut request = self
            .http
            .post(format!("{}/session/json", self.base_url))
            .header(REFERER, &self.base_url)
            .json(&body);
        if let Some(session) = &self.session {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={session}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DirectoryError::Unauthorized(
                "Session is no longer valid".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(DirectoryError::Unexpected {
                code: None,
                message: format!("{method} returned HTTP {status}"),
            });
        }

        let envelope: Value = response.json().await?;
        if let Some(error) = envelope.get("error").filter(|error| !error.is_null()) {
            let code = error.get("code").and_then(Value::as_i64);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("directory call failed");
            return Err(error::map_rpc_error(code, message));
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Attribute view of one account, as returned by `user_show`. Values arrive
/// as lists; datetimes as tagged objects. Only the attributes the portal
/// flows read get accessors.
#[derive(Clone, Debug)]
pub struct DirectoryUser(Value);

impl DirectoryUser {
    #[must_use]
    pub fn new(attributes: Value) -> Self {
        Self(attributes)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.first_attr("uid").and_then(Value::as_str)
    }

    #[must_use]
    pub fn mail(&self) -> Option<&str> {
        self.first_attr("mail").and_then(Value::as_str)
    }

    /// The last-password-change timestamp, normalized to a comparable string.
    /// Used as the freshness claim in reset tokens; equality is all that
    /// matters, not parsing.
    #[must_use]
    pub fn last_password_change(&self) -> Option<String> {
        let value = self.first_attr("krblastpwdchange")?;
        match value {
            Value::String(text) => Some(text.clone()),
            Value::Object(map) => map
                .get("__datetime__")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        }
    }

    fn first_attr(&self, name: &str) -> Option<&Value> {
        let value = self.0.get(name)?;
        match value {
            Value::Array(items) => items.first(),
            other => Some(other),
        }
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Extract the session artifact from the login response's cookies.
fn session_cookie_value(response: &reqwest::Response) -> Option<String> {
    for header in response.headers().get_all(SET_COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        let Some(first_pair) = value.split(';').next() else {
            continue;
        };
        let mut parts = first_pair.splitn(2, '=');
        let name = parts.next().unwrap_or_default().trim();
        let cookie_value = parts.next().unwrap_or_default().trim();
        if name == SESSION_COOKIE && !cookie_value.is_empty() {
            return Some(cookie_value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_directory() -> Directory {
        Directory::new(DirectoryConfig {
            servers: vec!["ipa1.example.test".to_string(), "ipa2.example.test".to_string()],
            ca_cert: None,
            accept_invalid_certs: false,
        })
        .expect("client builds without CA material")
    }

    #[test]
    fn connect_any_picks_a_configured_replica() {
        let directory = test_directory();
        for _ in 0..16 {
            let client = directory.connect_any().expect("servers configured");
            assert!(directory
                .servers()
                .iter()
                .any(|server| server == client.hostname()));
        }
    }

    #[test]
    fn connect_any_fails_without_servers() {
        let directory = Directory::new(DirectoryConfig::default()).expect("client builds");
        assert!(matches!(
            directory.connect_any(),
            Err(DirectoryError::NoServers)
        ));
    }

    #[test]
    fn connect_to_binds_base_url() {
        let directory = test_directory();
        let client = directory.connect_to("ipa1.example.test");
        assert_eq!(client.hostname(), "ipa1.example.test");
        assert_eq!(client.base_url, "https://ipa1.example.test/ipa");
        assert!(client.session().is_none());
    }

    #[test]
    fn set_session_injects_artifact() {
        let directory = test_directory();
        let mut client = directory.connect_to("ipa1.example.test");
        client.set_session("artifact".to_string());
        assert_eq!(client.session(), Some("artifact"));
    }

    #[test]
    fn directory_user_reads_list_attributes() {
        let user = DirectoryUser::new(json!({
            "uid": ["alice"],
            "mail": ["alice@example.test"],
            "krblastpwdchange": [{"__datetime__": "20240101000000Z"}],
        }));
        assert_eq!(user.username(), Some("alice"));
        assert_eq!(user.mail(), Some("alice@example.test"));
        assert_eq!(
            user.last_password_change().as_deref(),
            Some("20240101000000Z")
        );
    }

    #[test]
    fn directory_user_reads_scalar_datetime() {
        let user = DirectoryUser::new(json!({
            "krblastpwdchange": ["20240101000000Z"],
        }));
        assert_eq!(
            user.last_password_change().as_deref(),
            Some("20240101000000Z")
        );
        assert_eq!(user.mail(), None);
    }
}
