//! Password verification against staff and client credential hashes.
//!
//! Stored hashes are Argon2id PHC strings; bcrypt hashes imported from the
//! previous system (`$2y$`, `$2b$`, `$2a$`) are accepted for verification only.
//! New hashes are always Argon2id.

use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, warn};

use super::{
    error::{AuthError, StoreError},
    principal::{ClientPrincipal, PrincipalDirectory, StaffPrincipal},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Result of resolving an identity and secret.
#[derive(Clone, Debug)]
pub enum Verification {
    Staff(StaffPrincipal),
    Client(ClientPrincipal),
    /// Secret matched a staff account that is disabled.
    Inactive(StaffPrincipal),
    NoMatch,
}

#[derive(Clone, Debug)]
pub struct CredentialVerifier {
    params: Params,
    /// Verified when no principal exists so timing does not leak account existence.
    dummy_hash: String,
}

impl CredentialVerifier {
    /// Build a verifier hashing new passwords with `params`.
    ///
    /// # Errors
    /// Returns `AuthError::Crypto` if the placeholder hash cannot be computed.
    pub fn new(params: Params) -> Result<Self, AuthError> {
        let dummy_hash = hash_with(&params, "calibra-placeholder-secret")?;
        Ok(Self { params, dummy_hash })
    }

    /// Hash a new password as an Argon2id PHC string.
    ///
    /// # Errors
    /// Returns `AuthError::Crypto` if hashing fails.
    pub fn hash_password(&self, password: &SecretString) -> Result<String, AuthError> {
        hash_with(&self.params, password.expose_secret())
    }

    /// Resolve `identity`, staff first, then client.
    ///
    /// A staff account whose secret matches but which is disabled yields
    /// `Verification::Inactive`; if the staff secret does not match, the client
    /// namespace is still consulted.
    ///
    /// # Errors
    /// Returns the directory's error when a lookup fails.
    pub async fn verify(
        &self,
        directory: &dyn PrincipalDirectory,
        identity: &str,
        secret: &SecretString,
    ) -> Result<Verification, StoreError> {
        let mut checked_any = false;

        if let Some(staff) = directory.staff_by_email(identity).await? {
            checked_any = true;
            if check_secret(secret, &staff.credential_hash).await {
                return Ok(if staff.active {
                    Verification::Staff(staff)
                } else {
                    Verification::Inactive(staff)
                });
            }
        }

        if let Some(client) = directory.client_by_email(identity).await? {
            checked_any = true;
            if check_secret(secret, &client.credential_hash).await {
                return Ok(Verification::Client(client));
            }
        }

        if !checked_any {
            let _ = check_secret(secret, &self.dummy_hash).await;
        }

        Ok(Verification::NoMatch)
    }

    /// Check a secret against a single stored hash.
    pub async fn matches(&self, secret: &SecretString, stored_hash: &str) -> bool {
        check_secret(secret, stored_hash).await
    }
}

/// Reject passwords shorter than the minimum length.
///
/// # Errors
/// Returns `AuthError::WeakPassword` when the password is too short.
pub fn validate_new_password(password: &SecretString) -> Result<(), AuthError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword {
            min_length: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

fn hash_with(params: &Params, password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Crypto(format!("hash error: {err}")))
}

async fn check_secret(secret: &SecretString, stored_hash: &str) -> bool {
    let secret = SecretString::from(secret.expose_secret().to_string());
    let stored_hash = stored_hash.to_string();
    // Slow hashes run off the async workers.
    match tokio::task::spawn_blocking(move || verify_hash(secret.expose_secret(), &stored_hash))
        .await
    {
        Ok(matched) => matched,
        Err(err) => {
            error!("password verification task failed: {err}");
            false
        }
    }
}

/// Constant-time comparison of `secret` against an Argon2 or bcrypt hash.
fn verify_hash(secret: &str, stored_hash: &str) -> bool {
    if BCRYPT_PREFIXES
        .iter()
        .any(|prefix| stored_hash.starts_with(*prefix))
    {
        return match bcrypt::verify(secret, stored_hash) {
            Ok(matched) => matched,
            Err(err) => {
                warn!("malformed bcrypt hash: {err}");
                false
            }
        };
    }

    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("malformed password hash: {err}");
            return false;
        }
    };

    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(err) => {
            warn!("password verification error: {err}");
            false
        }
    }
}
