//! Maps parsed arguments to the action the binary runs.

use crate::{
    api::HttpConfig,
    cli::{
        actions::{server::Args, Action},
        commands::{http, throttle, CMD_HASH_PASSWORD},
    },
};
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some((CMD_HASH_PASSWORD, _)) = matches.subcommand() {
        return Ok(Action::HashPassword);
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|v| !v.trim().is_empty())
        .context("missing required argument: --dsn")?;

    let http_opts = http::Options::parse(matches)?;
    let throttle_opts = throttle::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        http: HttpConfig {
            frontend_base_url: http_opts.frontend_base_url,
            trust_proxy_headers: http_opts.trust_proxy_headers,
        },
        throttle: throttle_opts,
    }))
}
