//! Password-derived encryption for local store entries.
//!
//! Entries are sealed with ChaCha20-Poly1305 under a key derived from the
//! password with Blake3 key derivation. Every seal uses a fresh random nonce.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};

/// Domain separation context for entry keys.
const KEY_CONTEXT: &str = "modchain-localstore-v0 entry encryption";

/// Nonce length for ChaCha20-Poly1305.
pub const NONCE_LEN: usize = 12;

/// Symmetric cipher for local store entries.
///
/// Key material is wiped from memory on drop.
#[derive(Clone)]
pub struct EntryCipher {
    key: Zeroizing<[u8; 32]>,
}

impl EntryCipher {
    /// Derive the entry key from a password.
    pub fn from_password(password: &str) -> Self {
        let password = Zeroizing::new(password.as_bytes().to_vec());
        Self {
            key: Zeroizing::new(blake3::derive_key(KEY_CONTEXT, &password)),
        }
    }

    /// Encrypt a plaintext entry.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedEntry> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key[..])
            .map_err(|e| StoreError::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| StoreError::Encryption(e.to_string()))?;

        Ok(SealedEntry { nonce, ciphertext })
    }

    /// Decrypt a sealed entry. Fails on a wrong key or tampered ciphertext.
    pub fn open(&self, sealed: &SealedEntry) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.key[..])
            .map_err(|e| StoreError::Decryption(e.to_string()))?;

        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|_| StoreError::Decryption("wrong password or corrupted entry".into()))
    }
}

impl fmt::Debug for EntryCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntryCipher(..)")
    }
}

/// An encrypted entry: nonce plus ciphertext (with authentication tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEntry {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedEntry {
    /// Hex of `nonce || ciphertext`, the on-disk form.
    pub fn to_hex(&self) -> String {
        let mut buf = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        hex::encode(buf)
    }

    /// Parse the on-disk form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if bytes.len() < NONCE_LEN {
            return Err(StoreError::Serialization("sealed entry too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut arr = [0u8; NONCE_LEN];
        arr.copy_from_slice(nonce);
        Ok(Self {
            nonce: arr,
            ciphertext: ciphertext.to_vec(),
        })
    }
}
