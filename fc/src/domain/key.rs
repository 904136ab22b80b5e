//! Filter keys
//!
//! A key correlates a filter value with the controllers acting on it.
//! The empty string is the "empty" sentinel and is never a valid attachment.

/// Immutable identifier for one attachment within a context
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterKey(String);

impl FilterKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The empty sentinel
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FilterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FilterKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FilterKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for FilterKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for FilterKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FilterKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel() {
        assert!(FilterKey::empty().is_empty());
        assert!(FilterKey::default().is_empty());
        assert!(FilterKey::from("").is_empty());
        assert!(!FilterKey::new("status").is_empty());
    }

    #[test]
    fn test_compared_by_value() {
        assert_eq!(FilterKey::new("status"), FilterKey::from("status".to_string()));
        assert_ne!(FilterKey::new("status"), FilterKey::new("Status"));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let key = FilterKey::new("page-size");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"page-size\"");

        let back: FilterKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
