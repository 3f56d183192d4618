//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$digest`) so
//! verification reads every parameter back out of the stored value. Changing
//! [`HashParams`] only affects new hashes; old hashes keep verifying with the
//! parameters they were created with.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use rand::{RngCore, rngs::OsRng};
use std::{num::NonZeroUsize, sync::Arc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, debug_span};

const DEFAULT_MEMORY_KIB: u32 = 128 * 1024;
const DEFAULT_ITERATIONS: u32 = 4;
const DEFAULT_PARALLELISM: u32 = 4;
const DEFAULT_SALT_LENGTH: usize = 16;
const DEFAULT_OUTPUT_LENGTH: usize = 32;

// argon2 wants at least 8 bytes of salt; SaltString caps the b64 form at 64 chars.
const MIN_SALT_LENGTH: usize = 8;
const MAX_SALT_LENGTH: usize = 48;

// Hashed when the hasher is built and used to spend verification time on unknown emails.
const DUMMY_PASSWORD: &str = "snptx-timing-equalizer";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("malformed password hash")]
    Malformed,
    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),
}

/// Cost parameters for new hashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    salt_length: usize,
    output_length: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
            salt_length: DEFAULT_SALT_LENGTH,
            output_length: DEFAULT_OUTPUT_LENGTH,
        }
    }
}

impl HashParams {
    #[must_use]
    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Lane count is baked into each digest. Stored hashes keep the value they
    /// were created with, so a change only reaches users as they rehash.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_salt_length(mut self, salt_length: usize) -> Self {
        self.salt_length = salt_length;
        self
    }

    #[must_use]
    pub fn with_output_length(mut self, output_length: usize) -> Self {
        self.output_length = output_length;
        self
    }

    #[must_use]
    pub fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    #[must_use]
    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    #[must_use]
    pub fn output_length(&self) -> usize {
        self.output_length
    }

    /// Check the parameters against argon2's limits.
    ///
    /// # Errors
    /// Returns [`PasswordError::InvalidParams`] when argon2 would reject them.
    pub fn validate(&self) -> Result<(), PasswordError> {
        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&self.salt_length) {
            return Err(PasswordError::InvalidParams(format!(
                "salt length must be between {MIN_SALT_LENGTH} and {MAX_SALT_LENGTH} bytes"
            )));
        }
        self.argon2().map(|_| ())
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.output_length),
        )
        .map_err(|err| PasswordError::InvalidParams(err.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash `password` with a fresh random salt.
///
/// # Errors
/// Returns [`PasswordError::Hashing`] if the OS RNG or argon2 fails.
pub fn hash_password(password: &str, params: &HashParams) -> Result<String, PasswordError> {
    params.validate()?;

    let mut salt = vec![0u8; params.salt_length];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|err| PasswordError::Hashing(format!("failed to generate salt: {err}")))?;
    let salt =
        SaltString::encode_b64(&salt).map_err(|err| PasswordError::Hashing(err.to_string()))?;

    let hash = params
        .argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| PasswordError::Hashing(err.to_string()))?;

    Ok(hash.to_string())
}

/// Verify `password` against a stored PHC string.
///
/// A wrong password is `Ok(false)`; only an unparseable hash is an error.
/// The digest comparison is constant time.
///
/// # Errors
/// Returns [`PasswordError::Malformed`] if `hash` is not a usable argon2 PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::Malformed)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(_) => Err(PasswordError::Malformed),
    }
}

/// Async front end to the hash functions.
///
/// Work runs on the blocking pool behind a semaphore so a burst of logins
/// cannot occupy every blocking thread or all available memory. The permit
/// travels with the blocking task, so a caller that gives up early does not
/// free its slot while argon2 is still running.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: HashParams,
    permits: Arc<Semaphore>,
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// Builds the hasher and the timing-equalizer hash up front, so this
    /// spends one full hash and belongs at startup.
    ///
    /// # Errors
    /// Returns [`PasswordError::InvalidParams`] if `params` are out of range.
    pub fn new(params: HashParams, concurrency: Option<NonZeroUsize>) -> Result<Self, PasswordError> {
        params.validate()?;
        let concurrency = concurrency
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);
        let dummy_hash = hash_password(DUMMY_PASSWORD, &params)?;

        Ok(Self {
            params,
            permits: Arc::new(Semaphore::new(concurrency)),
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    #[must_use]
    pub fn params(&self) -> &HashParams {
        &self.params
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, PasswordError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|err| PasswordError::Hashing(err.to_string()))
    }

    /// # Errors
    /// Returns [`PasswordError::Hashing`] if hashing fails or the worker panics.
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let permit = self.permit().await?;

        let password = password.to_owned();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hash_password(&password, &params)
        })
        .instrument(debug_span!("password.hash"))
        .await
        .map_err(|err| PasswordError::Hashing(err.to_string()))?
    }

    /// # Errors
    /// Returns [`PasswordError::Malformed`] for an unparseable hash.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let permit = self.permit().await?;

        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            verify_password(&password, &hash)
        })
        .instrument(debug_span!("password.verify"))
        .await
        .map_err(|err| PasswordError::Hashing(err.to_string()))?
    }

    /// Spend one verification worth of work against a throwaway hash.
    ///
    /// Used when an email is unknown so the response time matches a real
    /// password mismatch.
    ///
    /// # Errors
    /// Returns [`PasswordError::Hashing`] if the worker fails.
    pub async fn verify_dummy(&self, password: &str) -> Result<(), PasswordError> {
        self.verify(password, &self.dummy_hash).await.map(|_| ())
    }
}
