//! Secret string type with automatic zeroization
//!
//! Provides [`SecretString`] with controlled access via closure API
//! to prevent accidental secret copying and automatic memory zeroization.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret string with automatic memory zeroization
///
/// Used for API secrets, session tickets and anti-forgery tokens. The value
/// is only reachable inside [`expose_secret`]; `Debug`, `Display` and
/// `Serialize` all print `[REDACTED]`.
///
/// [`expose_secret`]: SecretString::expose_secret
///
/// # Examples
///
/// ```
/// use stratus_credential::SecretString;
///
/// let secret = SecretString::new("hunter2");
/// assert_eq!(secret.expose_secret(str::len), 7);
/// assert_eq!(format!("{secret:?}"), "[REDACTED]");
/// ```
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Creates a new secret from any string-like value
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self { inner: s.into() }
    }

    /// Accesses secret value within a closure scope
    pub fn expose_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        f(&self.inner)
    }

    /// Returns the length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if empty without exposing content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// Prevent accidental secret leakage via Debug/Display
impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Serialize as redacted; the at-rest form goes through `SealedProfile`.
impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_everywhere() {
        let secret = SecretString::new("super-secret-password");

        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[REDACTED]\"");
    }

    #[test]
    fn deserializes_plain_value() {
        let secret: SecretString = serde_json::from_str("\"p@ss\"").unwrap();
        assert!(secret.expose_secret(|s| s == "p@ss"));
        assert_eq!(secret.len(), 4);
        assert!(!secret.is_empty());
    }
}
