//! Error types for credential operations
//!
//! - [`CredentialError`]: top-level error for credential sources and profiles
//! - [`CryptoError`]: encryption and key derivation failures
//!
//! Decryption has no error path in the public API: unreadable input is
//! treated as legacy plaintext (see [`CredentialCipher::decrypt`]).
//!
//! [`CredentialCipher::decrypt`]: crate::CredentialCipher::decrypt

use thiserror::Error;

/// Top-level credential error
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required value was not supplied by the credential source
    #[error("Missing credential value '{var}'")]
    Missing {
        /// Name of the missing variable or field
        var: String,
    },

    /// A supplied value is unusable
    #[error("Invalid profile field '{field}': {reason}")]
    InvalidProfile {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Cryptographic error
    #[error("Cryptographic error: {source}")]
    Crypto {
        /// Underlying crypto error
        #[from]
        source: CryptoError,
    },
}

/// Cryptographic operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Sealing the plaintext failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Opening the seal failed - wrong key or corrupted data
    #[error("Decryption failed - invalid key or corrupted data")]
    DecryptionFailed,

    /// The blob is not base64 or is shorter than a nonce
    #[error("Invalid ciphertext encoding: {0}")]
    InvalidEncoding(String),

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn crypto_error_converts_with_source() {
        let err: CredentialError = CryptoError::DecryptionFailed.into();
        assert!(matches!(err, CredentialError::Crypto { .. }));
        assert!(err.to_string().contains("Decryption failed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn missing_names_the_variable() {
        let err = CredentialError::Missing {
            var: "STRATUS_SECRET".to_string(),
        };
        assert_eq!(err.to_string(), "Missing credential value 'STRATUS_SECRET'");
    }
}
