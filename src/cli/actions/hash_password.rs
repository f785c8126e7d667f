use anyhow::{anyhow, Context, Result};
use argon2::Params;
use secrecy::SecretString;
use std::io::{self, BufRead};

use crate::auth::{credentials::validate_new_password, CredentialVerifier};

/// Read one password line from stdin and print its Argon2id PHC string.
/// # Errors
/// Returns an error if stdin cannot be read or the password is too short.
pub async fn execute() -> Result<()> {
    let line = tokio::task::spawn_blocking(|| -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("stdin reader panicked")?
    .context("Failed to read password from stdin")?;

    let hash = hash_line(&line)?;
    println!("{hash}");
    Ok(())
}

fn hash_line(line: &str) -> Result<String> {
    let password = SecretString::from(line.trim_end_matches(['\r', '\n']).to_string());
    validate_new_password(&password).map_err(|err| anyhow!("{err}"))?;

    let verifier = CredentialVerifier::new(Params::default())
        .map_err(|err| anyhow!("Failed to initialize password hashing: {err}"))?;
    verifier
        .hash_password(&password)
        .map_err(|err| anyhow!("Failed to hash password: {err}"))
}
