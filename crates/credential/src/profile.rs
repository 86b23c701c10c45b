//! Connection profiles
//!
//! A [`Profile`] is what the session layer needs to log in. Its at-rest form,
//! [`SealedProfile`], carries the secret sealed by a [`CredentialCipher`] and
//! is safe to serialize.

use serde::{Deserialize, Serialize};

use crate::crypto::CredentialCipher;
use crate::error::{CredentialError, CryptoError};
use crate::secret::SecretString;

/// Credentials and endpoint for one API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Human-readable profile name
    pub name: String,
    /// Login principal, e.g. `root@pam`
    pub principal: String,
    /// Login secret
    pub secret: SecretString,
    /// Base URL of the API server, without a trailing slash
    pub endpoint: String,
}

impl Profile {
    /// Build a profile, normalizing the endpoint
    pub fn new(
        name: impl Into<String>,
        principal: impl Into<String>,
        secret: impl Into<SecretString>,
        endpoint: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let principal = principal.into();
        if principal.trim().is_empty() {
            return Err(CredentialError::InvalidProfile {
                field: "principal",
                reason: "must not be empty".to_string(),
            });
        }

        let endpoint = endpoint.into();
        let endpoint = endpoint.trim().trim_end_matches('/');
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(CredentialError::InvalidProfile {
                field: "endpoint",
                reason: format!("'{endpoint}' is not an http(s) URL"),
            });
        }

        Ok(Self {
            name: name.into(),
            principal,
            secret: secret.into(),
            endpoint: endpoint.to_string(),
        })
    }

    /// Seal the secret for storage
    pub fn seal(&self, cipher: &CredentialCipher) -> Result<SealedProfile, CryptoError> {
        let secret = self.secret.expose_secret(|s| cipher.encrypt(s))?;
        Ok(SealedProfile {
            name: self.name.clone(),
            principal: self.principal.clone(),
            secret,
            endpoint: self.endpoint.clone(),
        })
    }
}

/// At-rest form of a [`Profile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedProfile {
    /// Profile name
    pub name: String,
    /// Login principal
    pub principal: String,
    /// Sealed secret, or legacy plaintext
    pub secret: String,
    /// Base URL of the API server
    pub endpoint: String,
}

impl SealedProfile {
    /// Open the secret
    ///
    /// Never fails: a secret that does not open under `cipher` is taken as
    /// plaintext.
    pub fn unseal(self, cipher: &CredentialCipher) -> Profile {
        let secret = SecretString::new(cipher.decrypt(&self.secret));
        Profile {
            name: self.name,
            principal: self.principal,
            secret,
            endpoint: self.endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MachineIdentity;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cipher() -> CredentialCipher {
        CredentialCipher::for_identity(&MachineIdentity::new("linux", "host", "0", "root"))
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let profile = Profile::new("lab", "root@pam", "pw", "https://pve:8006/").unwrap();
        assert_eq!(profile.endpoint, "https://pve:8006");
    }

    #[rstest]
    #[case("", "https://pve:8006", "principal")]
    #[case("root@pam", "pve:8006", "endpoint")]
    #[case("root@pam", "ftp://pve", "endpoint")]
    fn invalid_profiles_are_rejected(
        #[case] principal: &str,
        #[case] endpoint: &str,
        #[case] expected: &str,
    ) {
        let err = Profile::new("lab", principal, "pw", endpoint).unwrap_err();
        match err {
            CredentialError::InvalidProfile { field, .. } => assert_eq!(field, expected),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn seal_then_unseal_restores_secret() {
        let profile = Profile::new("lab", "root@pam", "hunter2", "https://pve:8006").unwrap();
        let sealed = profile.seal(&cipher()).unwrap();

        assert_ne!(sealed.secret, "hunter2");
        assert_eq!(sealed.clone().unseal(&cipher()), profile);
    }

    #[test]
    fn sealed_profile_serializes_without_plaintext() {
        let profile = Profile::new("lab", "root@pam", "hunter2", "https://pve:8006").unwrap();
        let text = toml::to_string(&profile.seal(&cipher()).unwrap()).unwrap();

        assert!(!text.contains("hunter2"));
        let back: SealedProfile = toml::from_str(&text).unwrap();
        assert_eq!(back.unseal(&cipher()).secret, profile.secret);
    }

    #[test]
    fn legacy_plaintext_secret_unseals_as_is() {
        let sealed = SealedProfile {
            name: "old".into(),
            principal: "root@pam".into(),
            secret: "plain-old-password".into(),
            endpoint: "https://pve:8006".into(),
        };
        let profile = sealed.unseal(&cipher());
        assert!(profile.secret.expose_secret(|s| s == "plain-old-password"));
    }
}
