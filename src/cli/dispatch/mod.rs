use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use secrecy::SecretString;
use std::path::PathBuf;

/// Turn parsed arguments into the action to run plus the immutable
/// process-wide configuration.
///
/// # Errors
/// Returns an error if a required argument is missing; clap enforces most of
/// that before we get here.
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
    };

    let servers = matches
        .get_many::<String>("server")
        .map(|values| values.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let globals = GlobalArgs {
        servers,
        ca_cert: matches.get_one::<String>("ca-cert").map(PathBuf::from),
        insecure: matches.get_flag("insecure"),
        base_url: required("base-url")?,
        session_key: SecretString::from(required("session-key")?),
        secret_key: SecretString::from(required("secret-key")?),
        admin_user: required("admin-user")?,
        admin_password: SecretString::from(required("admin-password")?),
        lock_dir: PathBuf::from(required("lock-dir")?),
        lock_expiration_minutes: matches
            .get_one::<u64>("lock-expiration")
            .copied()
            .unwrap_or(10),
        activation_expiration_minutes: matches
            .get_one::<i64>("activation-expiration")
            .copied()
            .unwrap_or(30),
        spamcheck_expiration_minutes: matches
            .get_one::<i64>("spamcheck-expiration")
            .copied()
            .unwrap_or(60),
        spamcheck_url: matches.get_one::<String>("spamcheck-url").cloned(),
    };

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
    };

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn handler_builds_action_and_globals() {
        let matches = commands::new().get_matches_from(vec![
            "sportello",
            "--port",
            "9000",
            "--server",
            "ipa1.example.test",
            "--server",
            "ipa2.example.test",
            "--session-key",
            "the-session-key",
            "--secret-key",
            "the-secret-key",
            "--admin-user",
            "admin",
            "--admin-password",
            "hunter2",
            "--spamcheck-url",
            "https://checker.test/scan",
        ]);

        let (action, globals) = handler(&matches).unwrap();

        let Action::Server { port } = action;
        assert_eq!(port, 9000);

        assert_eq!(
            globals.servers,
            vec!["ipa1.example.test", "ipa2.example.test"]
        );
        assert_eq!(globals.session_key.expose_secret(), "the-session-key");
        assert_eq!(globals.admin_user, "admin");
        assert_eq!(globals.lock_expiration_minutes, 10);
        assert_eq!(globals.activation_expiration_minutes, 30);
        assert_eq!(globals.spamcheck_expiration_minutes, 60);
        assert_eq!(
            globals.spamcheck_url.as_deref(),
            Some("https://checker.test/scan")
        );
        assert!(!globals.insecure);
    }
}
