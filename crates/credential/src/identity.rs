//! Machine and user identity
//!
//! The default credential key is bound to who and where the process runs.
//! None of these values are secret: anyone with the same account on the same
//! host can rebuild the key. [`EncryptionKey::derive_from_password`] is the
//! alternative when that is not acceptable.
//!
//! [`EncryptionKey::derive_from_password`]: crate::EncryptionKey::derive_from_password

use serde::{Deserialize, Serialize};

/// Identity tuple the machine-bound key is derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineIdentity {
    /// Operating system family (`linux`, `macos`, `windows`, ...)
    pub os_family: String,
    /// Host name as reported by the OS
    pub hostname: String,
    /// Numeric user id (empty where the platform has none)
    pub uid: String,
    /// Login name of the current user
    pub username: String,
}

impl MachineIdentity {
    /// Build an identity from explicit parts
    pub fn new(
        os_family: impl Into<String>,
        hostname: impl Into<String>,
        uid: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            os_family: os_family.into(),
            hostname: hostname.into(),
            uid: uid.into(),
            username: username.into(),
        }
    }

    /// Probe the running process
    ///
    /// Lookups that fail degrade to fixed placeholders rather than erroring,
    /// so the same machine always yields the same tuple.
    pub fn current() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        let (uid, username) = current_user();

        Self {
            os_family: std::env::consts::OS.to_string(),
            hostname,
            uid,
            username,
        }
    }

    /// Canonical byte encoding fed to the key hash
    pub(crate) fn key_material(&self) -> Vec<u8> {
        let mut material = Vec::with_capacity(
            self.os_family.len() + self.hostname.len() + self.uid.len() + self.username.len() + 3,
        );
        for (i, part) in [&self.os_family, &self.hostname, &self.uid, &self.username]
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                material.push(0);
            }
            material.extend_from_slice(part.as_bytes());
        }
        material
    }
}

#[cfg(unix)]
fn current_user() -> (String, String) {
    let uid = nix::unistd::getuid();
    let username = nix::unistd::User::from_uid(uid)
        .ok()
        .flatten()
        .map(|user| user.name)
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_default();
    (uid.to_string(), username)
}

#[cfg(not(unix))]
fn current_user() -> (String, String) {
    let username = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_default();
    (String::new(), username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable() {
        assert_eq!(MachineIdentity::current(), MachineIdentity::current());
        assert_eq!(MachineIdentity::current().os_family, std::env::consts::OS);
    }

    #[test]
    fn key_material_separates_fields() {
        let a = MachineIdentity::new("linux", "ab", "c", "d");
        let b = MachineIdentity::new("linux", "a", "bc", "d");
        assert_ne!(a.key_material(), b.key_material());
    }
}
