use anyhow::{bail, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

use crate::auth::{AuthConfig, ThrottleConfig};

pub const ARG_MAX_ATTEMPTS_PER_IDENTITY: &str = "max-attempts-per-identity";
pub const ARG_MAX_ATTEMPTS_PER_ADDRESS: &str = "max-attempts-per-address";
pub const ARG_THROTTLE_WINDOW_MINUTES: &str = "throttle-window-minutes";
pub const ARG_LOCKOUT_MINUTES: &str = "lockout-minutes";
pub const ARG_LEDGER_RETENTION_DAYS: &str = "ledger-retention-days";
pub const ARG_LEDGER_CLEANUP_INTERVAL_HOURS: &str = "ledger-cleanup-interval-hours";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub max_attempts_per_identity: u32,
    /// `None` means twice the identity limit.
    pub max_attempts_per_address: Option<u32>,
    pub window_minutes: u64,
    pub lockout_minutes: u64,
    pub ledger_retention_days: u64,
    pub ledger_cleanup_interval_hours: u64,
    pub session_ttl_seconds: u64,
}

impl Options {
    /// Parse and validate throttle, ledger and session arguments.
    ///
    /// # Errors
    /// Returns an error if a limit is zero or a duration is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| -> Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let max_attempts_per_identity = matches
            .get_one::<u32>(ARG_MAX_ATTEMPTS_PER_IDENTITY)
            .copied()
            .unwrap_or(5);
        let max_attempts_per_address = matches
            .get_one::<u32>(ARG_MAX_ATTEMPTS_PER_ADDRESS)
            .copied();

        let options = Self {
            max_attempts_per_identity,
            max_attempts_per_address,
            window_minutes: read(ARG_THROTTLE_WINDOW_MINUTES)?,
            lockout_minutes: read(ARG_LOCKOUT_MINUTES)?,
            ledger_retention_days: read(ARG_LEDGER_RETENTION_DAYS)?,
            ledger_cleanup_interval_hours: read(ARG_LEDGER_CLEANUP_INTERVAL_HOURS)?,
            session_ttl_seconds: read(ARG_SESSION_TTL_SECONDS)?,
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts_per_identity == 0 {
            bail!("--{ARG_MAX_ATTEMPTS_PER_IDENTITY} must be at least 1");
        }
        if self.max_attempts_per_address == Some(0) {
            bail!("--{ARG_MAX_ATTEMPTS_PER_ADDRESS} must be at least 1");
        }
        for (name, value) in [
            (ARG_THROTTLE_WINDOW_MINUTES, self.window_minutes),
            (ARG_LOCKOUT_MINUTES, self.lockout_minutes),
            (ARG_LEDGER_RETENTION_DAYS, self.ledger_retention_days),
            (
                ARG_LEDGER_CLEANUP_INTERVAL_HOURS,
                self.ledger_cleanup_interval_hours,
            ),
            (ARG_SESSION_TTL_SECONDS, self.session_ttl_seconds),
        ] {
            if value == 0 {
                bail!("--{name} must be greater than 0");
            }
        }
        // Pruning inside the window would forget failures that still count.
        if self.ledger_retention_days.saturating_mul(24 * 60) <= self.window_minutes {
            bail!("--{ARG_LEDGER_RETENTION_DAYS} must be longer than the throttle window");
        }
        Ok(())
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let mut throttle = ThrottleConfig::new()
            .with_max_attempts_per_identity(self.max_attempts_per_identity)
            .with_window(Duration::from_secs(self.window_minutes.saturating_mul(60)))
            .with_lockout(Duration::from_secs(self.lockout_minutes.saturating_mul(60)));
        if let Some(limit) = self.max_attempts_per_address {
            throttle = throttle.with_max_attempts_per_address(limit);
        }

        AuthConfig::new()
            .with_throttle(throttle)
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_ledger_retention_days(self.ledger_retention_days)
            .with_ledger_cleanup_interval_hours(self.ledger_cleanup_interval_hours)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_throttle_args(command);
    with_retention_args(command)
}

fn with_throttle_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS_PER_IDENTITY)
                .long(ARG_MAX_ATTEMPTS_PER_IDENTITY)
                .help("Failed logins allowed per email inside the window")
                .env("CALIBRA_MAX_ATTEMPTS_PER_IDENTITY")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS_PER_ADDRESS)
                .long(ARG_MAX_ATTEMPTS_PER_ADDRESS)
                .help("Failed logins allowed per source address inside the window (default: twice the identity limit)")
                .env("CALIBRA_MAX_ATTEMPTS_PER_ADDRESS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_THROTTLE_WINDOW_MINUTES)
                .long(ARG_THROTTLE_WINDOW_MINUTES)
                .help("Rolling window in minutes over which failures are counted")
                .env("CALIBRA_THROTTLE_WINDOW_MINUTES")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_MINUTES)
                .long(ARG_LOCKOUT_MINUTES)
                .help("Cooldown in minutes reported to locked out callers")
                .env("CALIBRA_LOCKOUT_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_retention_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LEDGER_RETENTION_DAYS)
                .long(ARG_LEDGER_RETENTION_DAYS)
                .help("Days login attempts are kept before cleanup")
                .env("CALIBRA_LEDGER_RETENTION_DAYS")
                .default_value("90")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_LEDGER_CLEANUP_INTERVAL_HOURS)
                .long(ARG_LEDGER_CLEANUP_INTERVAL_HOURS)
                .help("Hours between attempt ledger cleanup runs")
                .env("CALIBRA_LEDGER_CLEANUP_INTERVAL_HOURS")
                .default_value("168")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Bearer session TTL in seconds")
                .env("CALIBRA_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(u64)),
        )
}
