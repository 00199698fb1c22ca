//! Password policy, hashing and verification.

use regex::Regex;

use crate::error::{Error, Result};
use crate::token::SafeString;

/// bcrypt only looks at the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Check a plaintext password against the policy.
///
/// # Errors
///
/// Returns [`Error::Input`] naming the first rule the password breaks.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(Error::Input(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(Error::Input(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(Error::Input(
            "password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(Error::Input(
            "password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::Input("password must contain a digit".to_string()));
    }
    Ok(())
}

/// Salted bcrypt hash of `password`.
///
/// # Errors
///
/// Returns [`Error::Hash`] if bcrypt rejects the cost or input.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Compare `password` with a stored bcrypt hash in constant time.
///
/// # Errors
///
/// Returns [`Error::Hash`] if the stored hash cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// [`hash_password`] on the blocking pool.
///
/// bcrypt holds the CPU for the whole hash; running it inline would stall the
/// worker and keep request timeouts from firing.
///
/// # Errors
///
/// Returns [`Error::Hash`], or [`Error::Blocking`] if the task panicked or was
/// cancelled.
pub async fn spawn_hash_password(password: SafeString, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(password.expose(), cost)).await?
}

/// [`verify_password`] on the blocking pool.
///
/// # Errors
///
/// Returns [`Error::Hash`], or [`Error::Blocking`] if the task panicked or was
/// cancelled.
pub async fn spawn_verify_password(password: SafeString, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(password.expose(), &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@b.com"));
        assert!(valid_email("name.surname@example.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@c.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn policy_accepts_reference_password() {
        assert!(validate_password("Passw0rd").is_ok());
    }

    #[test]
    fn policy_rejects_weak_passwords() {
        for password in ["Pw0rd", "password1", "PASSWORD1", "Password", ""] {
            assert!(
                matches!(validate_password(password), Err(Error::Input(_))),
                "accepted {password:?}"
            );
        }
    }

    #[test]
    fn policy_rejects_passwords_over_byte_ceiling() {
        let password = format!("Aa1{}", "x".repeat(MAX_PASSWORD_BYTES));
        assert!(matches!(validate_password(&password), Err(Error::Input(_))));

        let password = format!("Aa1{}", "x".repeat(MAX_PASSWORD_BYTES - 3));
        assert!(validate_password(&password).is_ok());
    }

    #[test]
    fn hash_differs_from_plaintext_and_verifies() -> Result<()> {
        let hash = hash_password("Passw0rd", COST)?;
        assert_ne!(hash, "Passw0rd");
        assert!(verify_password("Passw0rd", &hash)?);
        assert!(!verify_password("Passw0rD", &hash)?);
        Ok(())
    }

    #[test]
    fn salts_make_hashes_unique() -> Result<()> {
        assert_ne!(
            hash_password("Passw0rd", COST)?,
            hash_password("Passw0rd", COST)?
        );
        Ok(())
    }

    #[tokio::test]
    async fn blocking_pool_variants_agree_with_inline() -> Result<()> {
        let hash = spawn_hash_password("Passw0rd".into(), COST).await?;
        assert!(hash.starts_with("$2b$04$"));
        assert!(spawn_verify_password("Passw0rd".into(), hash.clone()).await?);
        assert!(!spawn_verify_password("Passw0rD".into(), hash).await?);
        Ok(())
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(matches!(
            verify_password("Passw0rd", "not-a-hash"),
            Err(Error::Hash(_))
        ));
    }
}
