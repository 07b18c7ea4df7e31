use serde::{Deserialize, Serialize};

use crate::markers::Marker;
use crate::tree::Document;

const DEFAULT_SCHEMA: &str = "manos-doc-model";

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

/// Serialized form of a model: the document tree plus its markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub version: u64,
    pub document: Document,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
}

impl ModelValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: 0,
            document,
            markers: Vec::new(),
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
