use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Password rule: at least 8 chars, one lowercase, one uppercase, one digit
/// and one symbol (anything non-alphanumeric, underscore included).
pub fn validate_complexity(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("Aa1!aaaa").unwrap();
        let b = hash_password("Aa1!aaaa").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn complexity_accepts_valid_password() {
        assert!(validate_complexity("Aa1!aaaa"));
        assert!(validate_complexity("Str0ng_pass"));
    }

    #[test]
    fn complexity_rejects_missing_classes() {
        assert!(!validate_complexity("Aa1!aaa")); // too short
        assert!(!validate_complexity("AA1!AAAA")); // no lowercase
        assert!(!validate_complexity("aa1!aaaa")); // no uppercase
        assert!(!validate_complexity("Aab!aaaa")); // no digit
        assert!(!validate_complexity("Aa1aaaaa")); // no symbol
    }

    #[test]
    fn underscore_counts_as_symbol() {
        assert!(validate_complexity("Aa1_aaaa"));
    }
}
