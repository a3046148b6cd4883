//! # Sensitive Values
//!
//! Wrapper for secrets that must never appear in textual output.
//!
//! `Display`, `Debug` and `Serialize` all render [`REDACTION_MARKER`]; the
//! underlying value is only reachable through
//! [`SensitiveString::expose_secret`]. The buffer is zeroed on drop.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

/// Fixed marker emitted in place of any sensitive value.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// A string that redacts itself in every textual representation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SensitiveString(String);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying secret.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SensitiveString")
            .field(&REDACTION_MARKER)
            .finish()
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTION_MARKER)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTION_MARKER)
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

impl Drop for SensitiveString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_to_marker() {
        let secret = SensitiveString::new("sk-test-123");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{REDACTION_MARKER}\""));
        assert_eq!(secret.expose_secret(), "sk-test-123");
    }

    #[test]
    fn test_display_and_debug_are_redacted() {
        let secret = SensitiveString::from("sk-test-123");
        assert_eq!(secret.to_string(), REDACTION_MARKER);
        let debug = format!("{secret:?}");
        assert!(!debug.contains("sk-test-123"));
        assert!(debug.contains(REDACTION_MARKER));
    }

    #[test]
    fn test_deserializes_from_plain_text() {
        let secret: SensitiveString = serde_json::from_str("\"hunter2-hunter2\"").unwrap();
        assert_eq!(secret.expose_secret(), "hunter2-hunter2");
        assert_eq!(secret.len(), 15);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_equality_compares_underlying_value() {
        assert_eq!(SensitiveString::from("a"), SensitiveString::from("a"));
        assert_ne!(SensitiveString::from("a"), SensitiveString::from("b"));
    }
}
