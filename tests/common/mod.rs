#![allow(dead_code)]

use anyhow::{anyhow, Result};
use argon2::Params;
use calibra::{
    auth::{
        AuthConfig, Authenticator, ClientContext, ClientPrincipal, CredentialVerifier,
        LoginInput, LoginOutcome, ManualClock, StaffPrincipal, StaffRole,
    },
    store::MemoryStore,
};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

pub const PASSWORD: &str = "calibrated-2024";
pub const ADDRESS: &str = "10.0.0.1";
pub const USER_AGENT: &str = "integration-test";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub auth: Arc<Authenticator>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Argon2 params small enough to keep the suite fast.
pub fn fast_verifier() -> Result<CredentialVerifier> {
    let params = Params::new(1024, 1, 1, None).map_err(|err| anyhow!("{err}"))?;
    CredentialVerifier::new(params).map_err(|err| anyhow!("{err}"))
}

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(AuthConfig::new())
    }

    pub fn with_config(config: AuthConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let auth = Arc::new(Authenticator::new(
            store.clone(),
            clock.clone(),
            fast_verifier()?,
            config,
        ));
        Ok(Self { store, clock, auth })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        self.auth
            .verifier()
            .hash_password(&secret(password))
            .map_err(|err| anyhow!("{err}"))
    }

    pub async fn add_staff(&self, email: &str, role: StaffRole, active: bool) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.store
            .insert_staff(StaffPrincipal {
                id,
                name: format!("Staff {email}"),
                email: email.to_string(),
                credential_hash: self.hash(PASSWORD)?,
                role,
                active,
                last_login_at: None,
            })
            .await;
        Ok(id)
    }

    pub async fn add_client(&self, email: &str, password: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.store
            .insert_client(ClientPrincipal {
                id,
                display_name: format!("Client {email}"),
                email: email.to_string(),
                credential_hash: self.hash(password)?,
                last_login_at: None,
            })
            .await;
        Ok(id)
    }

    pub async fn login(&self, email: &str, password: &str, address: &str) -> Result<LoginOutcome> {
        self.auth
            .login(LoginInput {
                identity: email.to_string(),
                secret: secret(password),
                client: ClientContext::new(address, USER_AGENT),
            })
            .await
            .map_err(|err| anyhow!("{err}"))
    }
}
