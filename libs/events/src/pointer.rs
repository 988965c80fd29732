//! Slash-separated pointers into JSON objects.

use serde_json::{Map, Value};

use crate::EventError;

/// Path into a JSON object, written as `/a/b/c`.
///
/// The leading slash is optional when parsing. Empty segments (`a//b`) are
/// rejected. The empty pointer addresses the object itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The pointer addressing the whole object.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Result<Self, EventError> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(EventError::InvalidPointer {
                    pointer: s.to_string(),
                    reason: "empty segment",
                });
            }
            if segment.chars().any(char::is_control) {
                return Err(EventError::InvalidPointer {
                    pointer: s.escape_default().to_string(),
                    reason: "control character in segment",
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the value at this pointer, if present.
    pub fn get<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = object;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(last)
    }

    /// Sets the value at this pointer, creating intermediate objects.
    ///
    /// Intermediate values that are not objects are replaced. Setting the root
    /// pointer requires an object value, which replaces the whole map.
    pub fn set(&self, object: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            if let Value::Object(map) = value {
                *object = map;
            }
            return;
        };

        let mut current = object;
        for segment in parents {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert(last.clone(), value);
    }

    /// Removes the value at this pointer. Removing an absent value is a no-op.
    ///
    /// Returns true if something was removed.
    pub fn remove(&self, object: &mut Map<String, Value>) -> bool {
        let Some((last, parents)) = self.segments.split_last() else {
            let removed = !object.is_empty();
            object.clear();
            return removed;
        };

        let mut current = object;
        for segment in parents {
            match current.get_mut(segment) {
                Some(Value::Object(next)) => current = next,
                _ => return false,
            }
        }
        current.remove(last).is_some()
    }
}

impl std::fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for JsonPointer {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for JsonPointer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for JsonPointer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_parse() {
        let pointer = JsonPointer::parse("/location/lat").unwrap();
        assert_eq!(pointer.segments(), ["location", "lat"]);
        assert_eq!(pointer.to_string(), "/location/lat");

        let relative = JsonPointer::parse("location/lat").unwrap();
        assert_eq!(relative, pointer);

        assert!(JsonPointer::parse("/").unwrap().is_root());
        assert!(JsonPointer::parse("").unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        let err = JsonPointer::parse("a//b").unwrap_err();
        assert!(matches!(err, EventError::InvalidPointer { reason: "empty segment", .. }));
        assert!(JsonPointer::parse("/a/").is_err());
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut map = Map::new();
        JsonPointer::parse("/a/b/c").unwrap().set(&mut map, json!(1));
        assert_eq!(Value::Object(map), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut map = object(json!({"a": 5}));
        JsonPointer::parse("/a/b").unwrap().set(&mut map, json!(true));
        assert_eq!(Value::Object(map), json!({"a": {"b": true}}));
    }

    #[test]
    fn test_get() {
        let map = object(json!({"a": {"b": 2}}));
        let pointer = JsonPointer::parse("/a/b").unwrap();
        assert_eq!(pointer.get(&map), Some(&json!(2)));
        assert_eq!(JsonPointer::parse("/a/x").unwrap().get(&map), None);
        assert_eq!(JsonPointer::parse("/a/b/c").unwrap().get(&map), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut map = object(json!({"a": {"b": 2, "c": 3}}));
        let pointer = JsonPointer::parse("/a/b").unwrap();
        assert!(pointer.remove(&mut map));
        assert!(!pointer.remove(&mut map));
        assert_eq!(Value::Object(map), json!({"a": {"c": 3}}));
    }

    #[test]
    fn test_json_representation() {
        let pointer = JsonPointer::parse("x/y").unwrap();
        assert_eq!(serde_json::to_string(&pointer).unwrap(), "\"/x/y\"");
        assert!(serde_json::from_str::<JsonPointer>("\"x//y\"").is_err());
    }
}
