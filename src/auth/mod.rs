//! Login core: throttling, credential verification, sessions and the two logs.
//!
//! Storage is reached only through the traits in this module so the same
//! orchestration runs against Postgres in production and memory in tests.

pub mod account;
pub mod audit;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod ledger;
pub mod login;
pub mod principal;
pub mod session;
pub mod throttle;

pub use account::AuthenticatedSession;
pub use audit::{AuditAction, AuditEntry, AuditTrail, NewAuditEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use credentials::{CredentialVerifier, Verification};
pub use error::{AuthError, StoreError};
pub use ledger::{AttemptLedger, AttemptRecord, Dimension, FailureReason, NewAttempt};
pub use login::{Authenticator, ClientContext, LoginInput, LoginOutcome, LoginSuccess};
pub use principal::{
    ActorKind, ClientPrincipal, Principal, PrincipalDirectory, PrincipalKind, StaffPrincipal,
    StaffRole,
};
pub use session::{NewSession, SessionRecord, SessionStore};
pub use throttle::{ThrottleConfig, ThrottleDecision, ThrottleEvaluator};
