//! Credential sources
//!
//! The session layer asks a [`CredentialSource`] for a [`Profile`] each time
//! it needs to log in, so a rotated secret is picked up on the next
//! re-authentication without rebuilding the client.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::crypto::CredentialCipher;
use crate::error::CredentialError;
use crate::profile::Profile;

/// Supplies login credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current credentials
    async fn credentials(&self) -> Result<Profile, CredentialError>;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    async fn credentials(&self) -> Result<Profile, CredentialError> {
        (**self).credentials().await
    }
}

/// Fixed, in-memory credentials
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    profile: Profile,
}

impl StaticCredentials {
    /// Wrap a profile
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials(&self) -> Result<Profile, CredentialError> {
        Ok(self.profile.clone())
    }
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Credentials read from environment variables
///
/// Reads `<PREFIX>_PRINCIPAL`, `<PREFIX>_SECRET` and `<PREFIX>_ENDPOINT`,
/// plus an optional `<PREFIX>_PROFILE` name. With a cipher attached the
/// secret may be a sealed value; plaintext still works.
#[derive(Clone)]
pub struct EnvCredentials {
    prefix: String,
    cipher: Option<CredentialCipher>,
    lookup: Lookup,
}

impl EnvCredentials {
    /// Default variable prefix
    pub const DEFAULT_PREFIX: &'static str = "STRATUS";

    /// Read from the process environment with the default prefix
    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    /// Read from the process environment with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            cipher: None,
            lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the variable lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Open the secret with `cipher`
    pub fn with_cipher(mut self, cipher: CredentialCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    fn var(&self, suffix: &str) -> Option<String> {
        let key = format!("{}_{suffix}", self.prefix);
        (self.lookup)(&key).filter(|v| !v.is_empty())
    }

    fn required(&self, suffix: &str) -> Result<String, CredentialError> {
        self.var(suffix).ok_or_else(|| CredentialError::Missing {
            var: format!("{}_{suffix}", self.prefix),
        })
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("prefix", &self.prefix)
            .field("sealed", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn credentials(&self) -> Result<Profile, CredentialError> {
        let principal = self.required("PRINCIPAL")?;
        let endpoint = self.required("ENDPOINT")?;
        let mut secret = self.required("SECRET")?;
        if let Some(cipher) = &self.cipher {
            secret = cipher.decrypt(&secret);
        }
        let name = self.var("PROFILE").unwrap_or_else(|| "env".to_string());

        Profile::new(name, principal, secret, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MachineIdentity;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[tokio::test]
    async fn reads_all_variables() {
        let source = EnvCredentials::new().with_lookup(env(&[
            ("STRATUS_PRINCIPAL", "root@pam"),
            ("STRATUS_SECRET", "pw"),
            ("STRATUS_ENDPOINT", "https://pve:8006"),
            ("STRATUS_PROFILE", "lab"),
        ]));

        let profile = source.credentials().await.unwrap();
        assert_eq!(profile.name, "lab");
        assert_eq!(profile.principal, "root@pam");
        assert!(profile.secret.expose_secret(|s| s == "pw"));
    }

    #[tokio::test]
    async fn missing_secret_is_reported() {
        let source = EnvCredentials::with_prefix("PVE").with_lookup(env(&[
            ("PVE_PRINCIPAL", "root@pam"),
            ("PVE_ENDPOINT", "https://pve:8006"),
        ]));

        match source.credentials().await {
            Err(CredentialError::Missing { var }) => assert_eq!(var, "PVE_SECRET"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sealed_secret_is_opened() {
        let cipher = CredentialCipher::for_identity(&MachineIdentity::new("linux", "h", "1", "u"));
        let sealed = cipher.encrypt("pw").unwrap();
        let source = EnvCredentials::new()
            .with_cipher(cipher)
            .with_lookup(env(&[
                ("STRATUS_PRINCIPAL", "root@pam"),
                ("STRATUS_SECRET", sealed.as_str()),
                ("STRATUS_ENDPOINT", "https://pve:8006"),
            ]));

        let profile = source.credentials().await.unwrap();
        assert!(profile.secret.expose_secret(|s| s == "pw"));
        assert_eq!(profile.name, "env");
    }

    #[tokio::test]
    async fn static_source_via_arc() {
        let profile = Profile::new("lab", "root@pam", "pw", "https://pve:8006").unwrap();
        let source: Arc<dyn CredentialSource> = Arc::new(StaticCredentials::new(profile.clone()));
        assert_eq!(source.credentials().await.unwrap(), profile);
    }
}
