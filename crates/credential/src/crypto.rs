//! Credential encryption
//!
//! Stored secrets are sealed with AES-256-GCM. The at-rest text is
//! `base64(nonce || ciphertext || tag)` using the standard alphabet with
//! padding and a fresh 12-byte nonce per call.
//!
//! Opening is deliberately forgiving: anything that is not a valid seal under
//! the current key comes back unchanged, so secrets written before encryption
//! was introduced keep working.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::identity::MachineIdentity;

/// Nonce length for AES-256-GCM in bytes
pub const NONCE_LEN: usize = 12;

/// Domain label mixed into the machine-bound key
const MACHINE_KEY_LABEL: &[u8] = b"stratus-credential/machine-key/v1\0";

/// Minimum salt length accepted by Argon2
const MIN_SALT_LEN: usize = 8;

/// 256-bit AES key, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; 32],
}

impl EncryptionKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Key bound to an identity tuple
    ///
    /// SHA-256 over a fixed label and the identity fields. Deterministic:
    /// the same tuple always yields the same key.
    pub fn from_identity(identity: &MachineIdentity) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(MACHINE_KEY_LABEL);
        hasher.update(identity.key_material());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self { bytes }
    }

    /// Key bound to the current machine and user
    pub fn for_current_machine() -> Self {
        Self::from_identity(&MachineIdentity::current())
    }

    /// Derive a key from a passphrase using Argon2id
    ///
    /// `salt` must be at least 8 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_credential::EncryptionKey;
    ///
    /// let a = EncryptionKey::derive_from_password("correct horse", &[7u8; 16]).unwrap();
    /// let b = EncryptionKey::derive_from_password("correct horse", &[7u8; 16]).unwrap();
    /// assert_eq!(a.fingerprint(), b.fingerprint());
    /// ```
    pub fn derive_from_password(password: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        if salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::KeyDerivation(format!(
                "salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }

        let params = Params::new(19 * 1024, 2, 1, Some(32))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut bytes = [0u8; 32];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut bytes)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Short non-secret identifier of the key
    ///
    /// Hex of the first 8 bytes of SHA-256 over the key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Seals and opens stored credential strings
#[derive(Clone, Debug)]
pub struct CredentialCipher {
    key: EncryptionKey,
}

impl CredentialCipher {
    /// Cipher over an explicit key
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Cipher keyed to the current machine and user
    pub fn for_current_machine() -> Self {
        Self::new(EncryptionKey::for_current_machine())
    }

    /// Cipher keyed to the given identity
    pub fn for_identity(identity: &MachineIdentity) -> Self {
        Self::new(EncryptionKey::from_identity(identity))
    }

    /// Fingerprint of the underlying key
    pub fn fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.bytes))
    }

    /// Seal a plaintext into its at-rest form
    ///
    /// Two calls with the same input produce different outputs.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Open a sealed value, failing on anything that is not a valid seal
    pub fn try_decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        let blob = STANDARD
            .decode(sealed)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        if blob.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidEncoding(format!(
                "{} bytes is too short for a sealed value",
                blob.len()
            )));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let mut plaintext = self
            .aead()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        match String::from_utf8(plaintext) {
            Ok(text) => Ok(text),
            Err(err) => {
                plaintext = err.into_bytes();
                plaintext.zeroize();
                Err(CryptoError::DecryptionFailed)
            }
        }
    }

    /// Open a stored value
    ///
    /// Never fails. Input that is not base64, is too short, or does not
    /// authenticate under this key is returned as-is (legacy plaintext).
    pub fn decrypt(&self, stored: &str) -> String {
        match self.try_decrypt(stored) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::debug!(error = %err, "treating stored credential as plaintext");
                stored.to_string()
            }
        }
    }
}
