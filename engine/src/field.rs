//! Remote field specifications.
//!
//! A [`FieldSpec`] is the canonical description of one field in a remote
//! collection. Its serialized form is the backend's flat field JSON:
//! `{"name", "type", "required", "system", ...kind-specific options}`.

use crate::CollectionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field kinds understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Email,
    Url,
    Date,
    Autodate,
    File,
    Relation,
    /// Closed set of string values
    Select,
    Json,
    /// Rich text; only ever read from the backend
    Editor,
    /// Hashed secret of auth collections; only ever read from the backend
    Password,
    #[serde(rename = "geoPoint")]
    GeoPoint,
}

impl FieldKind {
    /// The backend's type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Date => "date",
            FieldKind::Autodate => "autodate",
            FieldKind::File => "file",
            FieldKind::Relation => "relation",
            FieldKind::Select => "select",
            FieldKind::Json => "json",
            FieldKind::Editor => "editor",
            FieldKind::Password => "password",
            FieldKind::GeoPoint => "geoPoint",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific options. Only the keys relevant to a field's kind are set;
/// anything the backend returns that is not modelled here is kept in `extra`
/// so that a fetched field can be written back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<CollectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_delete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_select: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_create: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One field of a remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Remote field id, assigned by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Field name, unique within a collection
    pub name: String,
    /// Field kind
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Owned by the backend, never user-writable
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub presentable: bool,
    #[serde(flatten)]
    pub options: FieldOptions,
}

impl FieldSpec {
    /// Create a user field with no options.
    pub fn new(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            required,
            system: false,
            hidden: false,
            presentable: false,
            options: FieldOptions::default(),
        }
    }

    /// Create a required user field.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::new(name, kind, true)
    }

    /// Create an optional user field.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::new(name, kind, false)
    }

    /// A system-owned autodate field.
    ///
    /// `on_update` controls whether the backend rewrites it on every update
    /// (`updated`) or only stamps it once on create (`created`).
    pub fn autodate(name: impl Into<String>, on_update: bool) -> Self {
        let mut field = Self::new(name, FieldKind::Autodate, false);
        field.system = true;
        field.options.on_create = Some(true);
        field.options.on_update = Some(on_update);
        field
    }

    /// A single-target relation to the collection with the given id.
    pub fn relation(name: impl Into<String>, required: bool, collection_id: CollectionId) -> Self {
        let mut field = Self::new(name, FieldKind::Relation, required);
        field.options.collection_id = Some(collection_id);
        field.options.cascade_delete = Some(false);
        field.options.min_select = Some(0);
        field.options.max_select = Some(1);
        field
    }

    /// A single-choice select over `values`.
    pub fn select(name: impl Into<String>, required: bool, values: Vec<String>) -> Self {
        let mut field = Self::new(name, FieldKind::Select, required);
        field.options.values = Some(values);
        field.options.max_select = Some(1);
        field
    }

    /// A single-file attachment field.
    pub fn file(name: impl Into<String>, required: bool) -> Self {
        let mut field = Self::new(name, FieldKind::File, required);
        field.options.max_select = Some(1);
        field
    }
}

/// Names of the system timestamp fields synthesized for every collection.
pub const CREATED: &str = "created";
pub const UPDATED: &str = "updated";
/// Name of the record identifier field.
pub const ID: &str = "id";

/// Whether `name` is one of the fields the backend owns on every record.
pub fn is_reserved(name: &str) -> bool {
    matches!(name, ID | CREATED | UPDATED)
}
