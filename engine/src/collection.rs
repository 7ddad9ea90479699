//! Remote collection definitions.

use crate::{CollectionId, CollectionName, FieldSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Collection type for ordinary record collections.
pub const BASE_COLLECTION: &str = "base";

/// The reconciler's view of one remote collection.
///
/// Always fetched fresh; never cached across reconciliations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSchema {
    pub id: CollectionId,
    pub name: CollectionName,
    #[serde(rename = "type", default = "base_type")]
    pub collection_type: String,
    /// Current fields, system fields included
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Rules, indexes and anything else the backend reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn base_type() -> String {
    BASE_COLLECTION.to_string()
}

impl RemoteSchema {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// A create or update request for a collection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    pub name: CollectionName,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub fields: Vec<FieldSpec>,
}

impl CollectionSpec {
    /// A base collection with the given fields.
    pub fn base(name: impl Into<CollectionName>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            collection_type: BASE_COLLECTION.to_string(),
            fields,
        }
    }
}
