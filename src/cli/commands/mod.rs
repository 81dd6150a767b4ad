use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("sportello")
        .about("Self-service account management portal")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SPORTELLO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .help("Directory replica hostname, repeatable (comma-separated in the environment)")
                .env("SPORTELLO_SERVERS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .required(true),
        )
        .arg(
            Arg::new("ca-cert")
                .long("ca-cert")
                .help("PEM CA bundle used to verify the directory replicas")
                .env("SPORTELLO_CA_CERT"),
        )
        .arg(
            Arg::new("insecure")
                .long("insecure")
                .help("Skip TLS verification of the directory replicas (development only)")
                .env("SPORTELLO_INSECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Public base URL of this portal, used in mailed links")
                .default_value("http://localhost:8080")
                .env("SPORTELLO_BASE_URL"),
        )
        .arg(
            Arg::new("session-key")
                .long("session-key")
                .help("32-byte base64url key encrypting stored directory sessions")
                .env("SPORTELLO_SESSION_KEY")
                .required(true),
        )
        .arg(
            Arg::new("secret-key")
                .long("secret-key")
                .help("Signing key for tokens and the portal cookie")
                .env("SPORTELLO_SECRET_KEY")
                .required(true),
        )
        .arg(
            Arg::new("admin-user")
                .long("admin-user")
                .help("Privileged directory identity for administrative operations")
                .env("SPORTELLO_ADMIN_USER")
                .required(true),
        )
        .arg(
            Arg::new("admin-password")
                .long("admin-password")
                .help("Password of the privileged directory identity")
                .env("SPORTELLO_ADMIN_PASSWORD")
                .required(true),
        )
        .arg(
            Arg::new("lock-dir")
                .long("lock-dir")
                .help("Directory holding password-reset lock markers")
                .default_value("/tmp/sportello-pw-reset")
                .env("SPORTELLO_LOCK_DIR"),
        )
        .arg(
            Arg::new("lock-expiration")
                .long("lock-expiration")
                .help("Minutes a password-reset request blocks the next one")
                .default_value("10")
                .env("SPORTELLO_LOCK_EXPIRATION")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("activation-expiration")
                .long("activation-expiration")
                .help("Minutes an account validation token stays valid")
                .default_value("30")
                .env("SPORTELLO_ACTIVATION_EXPIRATION")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("spamcheck-expiration")
                .long("spamcheck-expiration")
                .help("Minutes a spam-check token stays valid")
                .default_value("60")
                .env("SPORTELLO_SPAMCHECK_EXPIRATION")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("spamcheck-url")
                .long("spamcheck-url")
                .help("Registration spam checker endpoint; omit to skip the check")
                .env("SPORTELLO_SPAMCHECK_URL"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SPORTELLO_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_args() -> Vec<&'static str> {
        vec![
            "sportello",
            "--server",
            "ipa1.example.test",
            "--session-key",
            "a-session-key",
            "--secret-key",
            "a-secret-key",
            "--admin-user",
            "admin",
            "--admin-password",
            "hunter2",
        ]
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "sportello");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Self-service account management portal"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_defaults_and_required() {
        let command = new();
        let matches = command.get_matches_from(required_args());

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches
                .get_many::<String>("server")
                .map(|values| values.map(String::as_str).collect::<Vec<_>>()),
            Some(vec!["ipa1.example.test"])
        );
        assert_eq!(
            matches.get_one::<String>("lock-dir").map(String::as_str),
            Some("/tmp/sportello-pw-reset")
        );
        assert_eq!(matches.get_one::<u64>("lock-expiration").copied(), Some(10));
        assert_eq!(
            matches.get_one::<i64>("activation-expiration").copied(),
            Some(30)
        );
        assert_eq!(
            matches.get_one::<i64>("spamcheck-expiration").copied(),
            Some(60)
        );
        assert!(!matches.get_flag("insecure"));
        assert!(matches.get_one::<String>("spamcheck-url").is_none());
    }

    #[test]
    fn test_multiple_servers() {
        let command = new();
        let mut args = required_args();
        args.extend(["--server", "ipa2.example.test"]);
        let matches = command.get_matches_from(args);

        assert_eq!(
            matches
                .get_many::<String>("server")
                .map(|values| values.map(String::as_str).collect::<Vec<_>>()),
            Some(vec!["ipa1.example.test", "ipa2.example.test"])
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("SPORTELLO_PORT", Some("443")),
                (
                    "SPORTELLO_SERVERS",
                    Some("ipa1.example.test,ipa2.example.test"),
                ),
                ("SPORTELLO_SESSION_KEY", Some("env-session-key")),
                ("SPORTELLO_SECRET_KEY", Some("env-secret-key")),
                ("SPORTELLO_ADMIN_USER", Some("admin")),
                ("SPORTELLO_ADMIN_PASSWORD", Some("hunter2")),
                ("SPORTELLO_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["sportello"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches
                        .get_many::<String>("server")
                        .map(|values| values.map(String::as_str).collect::<Vec<_>>()),
                    Some(vec!["ipa1.example.test", "ipa2.example.test"])
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("SPORTELLO_LOG_LEVEL", Some(level)),
                    ("SPORTELLO_SERVERS", Some("ipa1.example.test")),
                    ("SPORTELLO_SESSION_KEY", Some("key")),
                    ("SPORTELLO_SECRET_KEY", Some("key")),
                    ("SPORTELLO_ADMIN_USER", Some("admin")),
                    ("SPORTELLO_ADMIN_PASSWORD", Some("hunter2")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["sportello"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").copied(),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("SPORTELLO_LOG_LEVEL", None::<String>)], || {
                let mut args: Vec<String> =
                    required_args().iter().map(ToString::to_string).collect();

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }
}
