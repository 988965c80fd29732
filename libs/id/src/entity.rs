//! Entity identifiers of the form `namespace:name`.

use crate::IdError;

/// Maximum length of the canonical `namespace:name` form.
pub const MAX_ENTITY_ID_LEN: usize = 256;

/// Identifier of a managed entity, immutable once assigned.
///
/// The namespace is either empty or a dot-separated list of segments, each
/// starting with an ASCII letter followed by letters, digits or `_`. The name
/// is non-empty and contains neither `/` nor control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    namespace: String,
    name: String,
}

impl EntityId {
    /// Creates an entity ID from its parts, validating both.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();

        let len = namespace.len() + 1 + name.len();
        if len > MAX_ENTITY_ID_LEN {
            return Err(IdError::TooLong {
                len,
                max: MAX_ENTITY_ID_LEN,
            });
        }

        validate_namespace(&namespace)?;
        validate_name(&name)?;

        Ok(Self { namespace, name })
    }

    /// Parses an entity ID from its canonical `namespace:name` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((namespace, name)) = s.split_once(':') else {
            return Err(IdError::MissingSeparator(':'));
        };

        Self::new(namespace, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this entity lives in the given namespace.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

fn validate_namespace(namespace: &str) -> Result<(), IdError> {
    if namespace.is_empty() {
        return Ok(());
    }

    for segment in namespace.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            None => {
                return Err(IdError::InvalidNamespace {
                    namespace: namespace.to_string(),
                    reason: "empty segment",
                })
            }
            Some(c) if !c.is_ascii_alphabetic() => {
                return Err(IdError::InvalidNamespace {
                    namespace: namespace.to_string(),
                    reason: "segment must start with a letter",
                })
            }
            Some(_) => {}
        }

        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(IdError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: "segment may only contain letters, digits and '_'",
            });
        }
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<(), IdError> {
    if name.is_empty() {
        return Err(IdError::InvalidName {
            name: name.to_string(),
            reason: "name cannot be empty",
        });
    }

    if name.contains('/') {
        return Err(IdError::InvalidName {
            name: name.to_string(),
            reason: "name cannot contain '/'",
        });
    }

    if name.chars().any(char::is_control) {
        return Err(IdError::InvalidName {
            name: name.escape_default().to_string(),
            reason: "name cannot contain control characters",
        });
    }

    Ok(())
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
