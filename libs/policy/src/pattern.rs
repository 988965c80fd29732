//! Whole-input regular expression patterns.

use regex::Regex;

use crate::PolicyError;

/// A regular expression that must match the entire input.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, PolicyError> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            PolicyError::InvalidPattern {
                pattern: source.to_string(),
                source: e,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl serde::Serialize for Pattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> serde::Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_whole_input_only() {
        let pattern = Pattern::new(".*:alice").unwrap();
        assert!(pattern.is_match("nginx:alice"));
        assert!(!pattern.is_match("nginx:alice2"));

        let pattern = Pattern::new("org|com").unwrap();
        assert!(pattern.is_match("org"));
        assert!(!pattern.is_match("org.example"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Pattern::new("(unclosed").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
    }
}
