pub mod http;
pub mod logging;
pub mod throttle;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_HASH_PASSWORD: &str = "hash-password";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("calibra")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_negates_reqs(true)
        .subcommand(
            Command::new(CMD_HASH_PASSWORD)
                .about("Read a password from stdin and print its Argon2id hash"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CALIBRA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("CALIBRA_DSN")
                .required(true),
        );

    let command = http::with_args(command);
    let command = throttle::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "calibra");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let matches = new().get_matches_from(vec![
            "calibra",
            "--port",
            "9090",
            "--dsn",
            "postgres://calibra@localhost:5432/calibra",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        assert_eq!(
            matches.get_one::<String>("dsn").cloned(),
            Some("postgres://calibra@localhost:5432/calibra".to_string())
        );
        assert!(matches.subcommand().is_none());
    }

    #[test]
    fn test_dsn_required() {
        temp_env::with_var_unset("CALIBRA_DSN", || {
            let result = new().try_get_matches_from(vec!["calibra"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_hash_password_needs_no_dsn() {
        temp_env::with_var_unset("CALIBRA_DSN", || {
            let matches = new()
                .try_get_matches_from(vec!["calibra", CMD_HASH_PASSWORD])
                .unwrap();
            assert_eq!(
                matches.subcommand().map(|(name, _)| name),
                Some(CMD_HASH_PASSWORD)
            );
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CALIBRA_PORT", Some("443")),
                ("CALIBRA_DSN", Some("postgres://calibra@db:5432/calibra")),
                ("CALIBRA_FRONTEND_BASE_URL", Some("https://lab.example.com")),
                ("CALIBRA_TRUST_PROXY_HEADERS", Some("true")),
                ("CALIBRA_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["calibra"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("dsn").cloned(),
                    Some("postgres://calibra@db:5432/calibra".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<String>(http::ARG_FRONTEND_BASE_URL)
                        .cloned(),
                    Some("https://lab.example.com".to_string())
                );
                assert!(matches.get_flag(http::ARG_TRUST_PROXY_HEADERS));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_verbose_flag_counts() {
        temp_env::with_var_unset("CALIBRA_LOG_LEVEL", || {
            let matches = new().get_matches_from(vec!["calibra", "-d", "postgres://x", "-vvv"]);
            assert_eq!(
                matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                Some(3)
            );
        });
    }
}
