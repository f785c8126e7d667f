//! # Calibra (Back-office authentication core)
//!
//! `calibra` authenticates staff and client principals of the metrology back
//! office and keeps the two append-only logs that surround every login:
//!
//! - **Attempt ledger:** one record per login attempt, used only for throttle
//!   accounting and pruned by a periodic cleanup job.
//! - **Audit trail:** security-relevant actions (logins, logouts, password
//!   changes), retained until an administrator bulk-clears it.
//!
//! ## Throttling
//!
//! Before any password hash is checked, failed attempts inside a short rolling
//! window are counted twice: once per submitted email and once per source
//! address. Either counter at its limit rejects the call with a lockout. The
//! check and the subsequent ledger write are not atomic, so the limits are
//! best-effort rather than hard.
//!
//! ## Principals
//!
//! Staff users are resolved before clients. Error messages never reveal which
//! namespace (if any) matched an email.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
