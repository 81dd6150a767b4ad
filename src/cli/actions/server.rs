use crate::api::{self, AppState, PortalConfig};
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::directory::{admin::DirectoryAdmin, Directory, DirectoryConfig};
use crate::email::LogEmailSender;
use crate::lock::ResetLock;
use crate::session::{SessionCodec, SessionManager, SignedCookie};
use crate::token::TokenSigner;
use crate::APP_USER_AGENT;
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Handle the server action: build every subsystem once from the immutable
/// configuration, then serve.
///
/// # Errors
/// Returns an error if key material, trust material, or the listener cannot
/// be set up. A bad session key stops the process here, before any session
/// could be sealed with it.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port } => {
            let directory = Arc::new(Directory::new(DirectoryConfig {
                servers: globals.servers.clone(),
                ca_cert: globals.ca_cert.clone(),
                accept_invalid_certs: globals.insecure,
            })?);

            let codec = SessionCodec::new(&globals.session_key)
                .map_err(|err| anyhow!("invalid session key: {err}"))?;
            let manager = SessionManager::new(directory.clone(), codec);

            let admin = DirectoryAdmin::new(
                directory.clone(),
                globals.admin_user.clone(),
                globals.admin_password.clone(),
            );

            let tokens = TokenSigner::new(
                globals.secret_key.clone(),
                globals.activation_expiration_minutes,
                globals.spamcheck_expiration_minutes,
            );

            let lock = ResetLock::new(globals.lock_dir.clone(), globals.lock_expiration_minutes);
            let cookie = SignedCookie::new(globals.secret_key.clone());
            let portal = PortalConfig::new(globals.base_url.clone())
                .with_spamcheck_url(globals.spamcheck_url.clone());

            let http = reqwest::Client::builder()
                .user_agent(APP_USER_AGENT)
                .build()?;

            let state = Arc::new(AppState::new(
                manager,
                admin,
                tokens,
                lock,
                Arc::new(LogEmailSender),
                cookie,
                directory,
                portal,
                http,
            ));

            api::new(port, state).await?;
        }
    }

    Ok(())
}
