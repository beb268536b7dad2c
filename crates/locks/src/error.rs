use thiserror::Error;

/// Errors that can occur when taking or releasing locks.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by someone else and the retry budget ran out.
    #[error("Lock {key} is busy after {attempts} attempts")]
    Busy { key: String, attempts: u32 },

    /// The lock store rejected or failed the command.
    #[error("Lock store error: {0}")]
    Backend(String),

    /// The Redis connection failed.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

impl LockError {
    /// Returns true if the caller should simply try again later.
    pub fn is_busy(&self) -> bool {
        matches!(self, LockError::Busy { .. })
    }
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
