//! Credential verification
//!
//! The auth service only sees [`PasswordHasher`]; bcrypt is the production
//! implementation.

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const BCRYPT_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
#[error("Password hashing failed: {0}")]
pub struct HashError(pub String);

/// Hash and verify plaintext secrets
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, HashError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable
    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError>;
}

/// bcrypt with automatic salt generation
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        bcrypt::hash(password, self.cost).map_err(|e| HashError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError> {
        bcrypt::verify(password, hash).map_err(|e| HashError(e.to_string()))
    }
}
