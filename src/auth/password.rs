use bcrypt::BcryptError;

pub use bcrypt::DEFAULT_COST;

/// bcrypt hash with an embedded salt and work factor
pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(password, cost)
}

/// Anything that is not a well-formed bcrypt hash never verifies
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// True for modular-crypt bcrypt strings (`$2a$`, `$2b$`, `$2x$`, `$2y$`)
pub fn is_hashed(value: &str) -> bool {
    value.len() == 60
        && ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|prefix| value.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn hashes_verify_and_are_salted() {
        let a = hash_password("hunter2", TEST_COST).unwrap();
        let b = hash_password("hunter2", TEST_COST).unwrap();
        assert_ne!(a, b);
        assert!(is_hashed(&a));
        assert!(verify_password("hunter2", &a));
        assert!(!verify_password("hunter3", &a));
        assert!(!verify_password("hunter2", "hunter2"));
    }

    #[test]
    fn plain_text_is_not_mistaken_for_a_hash() {
        assert!(!is_hashed("hunter2"));
        assert!(!is_hashed("$2b$04$short"));
        assert!(hash_password("x", 2).is_err());
    }
}
