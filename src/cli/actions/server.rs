use crate::{
    api::{self, HttpConfig},
    cli::commands::throttle,
};
use anyhow::Result;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub http: HttpConfig,
    pub throttle: throttle::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    api::new(
        args.port,
        args.dsn,
        args.throttle.auth_config(),
        args.http,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let address_limit = args.throttle.max_attempts_per_address.map_or_else(
        || {
            format!(
                "{} (2x identity)",
                args.throttle.max_attempts_per_identity.saturating_mul(2)
            )
        },
        |limit| limit.to_string(),
    );
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("frontend_base_url", args.http.frontend_base_url.clone()),
        (
            "trust_proxy_headers",
            args.http.trust_proxy_headers.to_string(),
        ),
        (
            "max_attempts_per_identity",
            args.throttle.max_attempts_per_identity.to_string(),
        ),
        ("max_attempts_per_address", address_limit),
        (
            "throttle_window",
            format!("{}m", args.throttle.window_minutes),
        ),
        ("lockout", format!("{}m", args.throttle.lockout_minutes)),
        (
            "ledger_retention",
            format!("{}d", args.throttle.ledger_retention_days),
        ),
        (
            "ledger_cleanup_interval",
            format!("{}h", args.throttle.ledger_cleanup_interval_hours),
        ),
        (
            "session_ttl",
            format!("{}s", args.throttle.session_ttl_seconds),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
