//! Per-entry AES-256-GCM envelope
//!
//! Stored payload format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The nonce travels in the clear ahead of the ciphertext, so a payload can
//! be opened with nothing but the key. No associated data is bound: the
//! entry name is not authenticated, only the bytes are.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::Key;
use crate::{NONCE_SIZE, TAG_SIZE};

/// A sealed entry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the GCM tag appended
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to the stored layout `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a stored payload into nonce and ciphertext.
    ///
    /// Only the nonce length is checked here; a payload too short to hold a
    /// tag fails later as an authentication failure.
    pub fn from_bytes(payload: &[u8]) -> CryptoResult<Self> {
        if payload.len() < NONCE_SIZE {
            return Err(CryptoError::PayloadTooShort {
                len: payload.len(),
                min: NONCE_SIZE,
            });
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Stored size for a plaintext of `plaintext_len` bytes.
    pub fn sealed_len(plaintext_len: usize) -> usize {
        NONCE_SIZE + plaintext_len + TAG_SIZE
    }

    /// Seal `plaintext` under `key` with a fresh random nonce.
    pub fn seal(key: &Key, plaintext: &[u8]) -> CryptoResult<Self> {
        let cipher = new_cipher(key.as_bytes())?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        Ok(Self { nonce, ciphertext })
    }

    /// Verify and decrypt.
    pub fn open(&self, key: &Key) -> CryptoResult<Vec<u8>> {
        let cipher = new_cipher(key.as_bytes())?;
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

fn new_cipher(key: &[u8]) -> CryptoResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::CipherInit {
        expected: crate::KEY_SIZE,
        actual: key.len(),
    })
}

/// Encrypt a buffer into the stored payload layout.
pub fn encrypt(plaintext: &[u8], key: &Key) -> CryptoResult<Vec<u8>> {
    Envelope::seal(key, plaintext).map(|env| env.to_bytes())
}

/// Decrypt a stored payload produced by [`encrypt`].
pub fn decrypt(payload: &[u8], key: &Key) -> CryptoResult<Vec<u8>> {
    Envelope::from_bytes(payload)?.open(key)
}
