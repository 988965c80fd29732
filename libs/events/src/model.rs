//! Thing domain data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The domain payload of an active thing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thing {
    /// Optional definition identifier, e.g. `org.example:sensor:1.0.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub features: BTreeMap<String, Feature>,
}

/// A named capability of a thing with its own properties.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Vec<String>>,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Thing {
    pub fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.get(feature_id)
    }

    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.features.contains_key(feature_id)
    }
}
