use std::fmt;

use argon2::{
    Algorithm, Argon2, ParamsBuilder, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use password_hash::Error as PasswordHashError;
use rand::{TryRngCore, rngs::OsRng};
use thiserror::Error;
use zeroize::Zeroizing;

pub use argon2::Params as HashParams;

/// One-way hashing of account secrets.
///
/// Secrets are hashed with Argon2id using a random salt per hash and an
/// optional server-side pepper. The output is a PHC string that carries the
/// algorithm, parameters and salt, so verification never needs the
/// parameters the hasher was built with.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    pepper: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", self.argon2.params())
            .field("peppered", &self.pepper.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("password pepper must not be empty")]
    EmptyPepper,
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),
    #[error("salt generation failed: {0}")]
    Randomness(String),
    #[error("password hashing error: {0}")]
    Hash(String),
}

impl From<PasswordHashError> for HashingError {
    fn from(err: PasswordHashError) -> Self {
        HashingError::Hash(err.to_string())
    }
}

/// A PHC-formatted Argon2 hash as stored at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedSecret(String);

impl HashedSecret {
    /// Wrap a hash read back from storage. The value is not parsed here; a
    /// malformed hash simply never verifies.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl CredentialHasher {
    /// ~64 MiB memory and 3 iterations, a fixed work factor that keeps a
    /// single hash in the tens of milliseconds on server hardware.
    const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
    const DEFAULT_ITERATIONS: u32 = 3;
    const DEFAULT_PARALLELISM: u32 = 1;
    const OUTPUT_LEN: usize = 32;
    const SALT_LENGTH: usize = password_hash::Salt::RECOMMENDED_LENGTH;

    /// Build a hasher with the default Argon2id parameters.
    pub fn new() -> Result<Self, HashingError> {
        let params = ParamsBuilder::new()
            .m_cost(Self::DEFAULT_MEMORY_KIB)
            .t_cost(Self::DEFAULT_ITERATIONS)
            .p_cost(Self::DEFAULT_PARALLELISM)
            .output_len(Self::OUTPUT_LEN)
            .build()
            .map_err(|err| HashingError::InvalidParams(err.to_string()))?;
        Ok(Self::with_params(params))
    }

    /// Build a hasher with caller-specified Argon2 parameters (useful for
    /// tests or constrained environments).
    pub fn with_params(params: HashParams) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), params),
            pepper: None,
        }
    }

    /// Mix a server-side secret into every hash. Hashes produced with a
    /// pepper only verify on hashers configured with the same pepper.
    pub fn with_pepper(
        mut self,
        pepper: impl AsRef<[u8]>,
    ) -> Result<Self, HashingError> {
        let pepper = pepper.as_ref();
        if pepper.is_empty() {
            return Err(HashingError::EmptyPepper);
        }
        self.pepper = Some(Zeroizing::new(pepper.to_vec()));
        Ok(self)
    }

    /// Hash a secret with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<HashedSecret, HashingError> {
        let material = self.material(secret);

        let mut salt_bytes = [0u8; Self::SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|err| HashingError::Randomness(err.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes)?;

        let hash = self.argon2.hash_password(&material, &salt)?.to_string();
        Ok(HashedSecret(hash))
    }

    /// Check a secret against a stored hash. Mismatches and unparseable
    /// hashes both yield `false`.
    pub fn verify(&self, secret: &str, hashed: &HashedSecret) -> bool {
        let Ok(parsed) = PasswordHash::new(hashed.as_str()) else {
            return false;
        };
        let material = self.material(secret);
        self.argon2.verify_password(&material, &parsed).is_ok()
    }

    fn material(&self, secret: &str) -> Zeroizing<Vec<u8>> {
        let pepper_len = self.pepper.as_ref().map_or(0, |p| p.len());
        let mut material =
            Zeroizing::new(Vec::with_capacity(secret.len() + pepper_len));
        material.extend_from_slice(secret.as_bytes());
        if let Some(pepper) = &self.pepper {
            material.extend_from_slice(pepper);
        }
        material
    }
}
