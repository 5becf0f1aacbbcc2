use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("cipher init failed: key is {actual} bytes, expected {expected}")]
    CipherInit { expected: usize, actual: usize },

    #[error("payload too short: {len} bytes (minimum {min})")]
    PayloadTooShort { len: usize, min: usize },

    /// Tampered payload and wrong key are deliberately reported the same way.
    #[error("authentication failed: wrong key or corrupted payload")]
    AuthenticationFailed,

    #[error("encryption failed: {0}")]
    Seal(String),
}
