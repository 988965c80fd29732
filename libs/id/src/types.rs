//! Generated IDs and the per-entity revision counter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::IdError;

// =============================================================================
// Generated IDs
// =============================================================================

/// Splits `{prefix}_{ulid}` and checks the prefix.
fn parse_prefixed(s: &str, prefix: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    let (actual, ulid) = s.split_once('_').ok_or(IdError::MissingSeparator('_'))?;
    if actual != prefix {
        return Err(IdError::InvalidPrefix {
            expected: prefix,
            actual: actual.to_string(),
        });
    }
    ulid.parse::<Ulid>()
        .map_err(|e| IdError::InvalidUlid(e.to_string()))
}

/// Token used to match responses to the command that caused them.
///
/// Callers may use any non-empty string as a correlation id; this type is what
/// the platform generates when the caller sent none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(Ulid);

impl CorrelationId {
    pub const PREFIX: &'static str = "corr";

    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        parse_prefixed(s, Self::PREFIX).map(Self)
    }
}

/// Unique identifier for a single submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandId(Ulid);

impl CommandId {
    pub const PREFIX: &'static str = "cmd";

    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        parse_prefixed(s, Self::PREFIX).map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for CommandId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<String> for CommandId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.to_string()
    }
}

impl From<CommandId> for String {
    fn from(id: CommandId) -> Self {
        id.to_string()
    }
}

// =============================================================================
// Revision
// =============================================================================

/// Per-entity revision used for ordering and optimistic concurrency.
///
/// A never-written entity is at [`Revision::ZERO`]. Every persisted event
/// moves the entity to exactly the next revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(u64);

impl Revision {
    /// The revision of an entity that has no persisted events.
    pub const ZERO: Self = Self(0);

    /// Creates a revision from a raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying counter value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the revision that the next persisted event will carry.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if no event has ever been persisted at this revision.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Revision> for u64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

impl serde::Serialize for Revision {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Revision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        Ok(Self(value))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_roundtrip() {
        let id = CorrelationId::new();
        let s = id.to_string();
        let parsed: CorrelationId = s.parse().unwrap();
        assert_eq!(id, parsed);
        assert!(s.starts_with("corr_"));
    }

    #[test]
    fn test_command_id_invalid_prefix() {
        let result: Result<CommandId, _> = "corr_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidPrefix { expected: "cmd", .. }
        ));
    }

    #[test]
    fn test_command_id_missing_separator() {
        let result: Result<CommandId, _> = "cmd01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert_eq!(result.unwrap_err(), crate::IdError::MissingSeparator('_'));
    }

    #[test]
    fn test_command_id_invalid_ulid() {
        let result: Result<CommandId, _> = "cmd_invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_correlation_id_json_roundtrip() {
        let id = CorrelationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_revision_starts_at_zero() {
        assert_eq!(Revision::default(), Revision::ZERO);
        assert!(Revision::ZERO.is_zero());
        assert_eq!(Revision::ZERO.next(), Revision::new(1));
    }

    #[test]
    fn test_revision_json_is_plain_number() {
        let json = serde_json::to_string(&Revision::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: Revision = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.value(), 7);
    }

    #[test]
    fn test_generated_ids_reject_empty() {
        assert_eq!(CorrelationId::parse("").unwrap_err(), crate::IdError::Empty);
        assert!(serde_json::from_str::<CommandId>("\"\"").is_err());
    }
}
