//! Stratus Credential - credentials for the virtualization API client
//!
//! # Features
//!
//! - **Credential encryption** - AES-256-GCM sealing of stored secrets with a
//!   key bound to the local machine and user, or derived from a passphrase
//! - **Legacy tolerance** - values written before encryption existed decrypt
//!   to themselves
//! - **Secret hygiene** - [`SecretString`] zeroizes on drop and never prints
//! - **Credential sources** - a narrow contract for whatever supplies
//!   `{principal, secret, endpoint}` to the session layer
#![forbid(unsafe_code)]

/// AES-256-GCM credential cipher and key derivation
pub mod crypto;
/// Error types
pub mod error;
/// Local machine and user identity used as key material
pub mod identity;
/// Connection profiles and their at-rest form
pub mod profile;
/// Secret string with zeroization
pub mod secret;
/// Credential source contract and implementations
pub mod source;

pub use crate::crypto::{CredentialCipher, EncryptionKey, NONCE_LEN};
pub use crate::error::{CredentialError, CryptoError};
pub use crate::identity::MachineIdentity;
pub use crate::profile::{Profile, SealedProfile};
pub use crate::secret::SecretString;
pub use crate::source::{CredentialSource, EnvCredentials, StaticCredentials};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::crypto::{CredentialCipher, EncryptionKey};
    pub use crate::error::{CredentialError, CryptoError};
    pub use crate::identity::MachineIdentity;
    pub use crate::profile::{Profile, SealedProfile};
    pub use crate::secret::SecretString;
    pub use crate::source::{CredentialSource, EnvCredentials, StaticCredentials};
}
