//! Route handlers and the helpers they share.

pub mod audit;
pub mod auth;
pub mod error;
pub mod health;
pub mod types;
pub mod utils;

pub use self::utils::ProxyPolicy;

/// Plain-text banner for `/`.
pub async fn root() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
