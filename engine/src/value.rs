//! Typed attribute values.
//!
//! Format-bearing strings ([`Email`], [`url::Url`]) validate on
//! construction, so a [`Value`] that exists is already well-formed.

use crate::{
    error::{Result, ValidationError},
    Error, Record,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub use url::Url;

/// An email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Validate and wrap an email address.
    pub fn parse(raw: &str) -> std::result::Result<Self, ValidationError> {
        let raw = raw.trim();
        if is_valid_email(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidFormat {
                field: String::new(),
                kind: "email".into(),
                value: raw.into(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !raw.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        Email::parse(&raw)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a timestamp as ISO-8601 with an explicit UTC offset.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parse RFC 3339 as well as the backend's `YYYY-MM-DD HH:MM:SS.sssZ` form.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|naive| naive.and_utc())
}

/// A file to attach on the next write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// The value of a file attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileValue {
    /// Bytes waiting to be uploaded
    Upload(FileUpload),
    /// Name of a file already stored by the backend
    Stored(String),
}

impl FileValue {
    /// The stored filename, if the file has been persisted.
    pub fn stored_name(&self) -> Option<&str> {
        match self {
            FileValue::Stored(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }
}

/// The value of a relation attribute: either the target's id or the
/// target record itself.
#[derive(Debug, Clone)]
pub enum Relation {
    Id(String),
    Record(Box<Record>),
}

impl Relation {
    /// Id of the related record.
    pub fn id(&self) -> &str {
        match self {
            Relation::Id(id) => id,
            Relation::Record(record) => &record.meta.id,
        }
    }

    /// The related record, when it was materialized.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Relation::Id(_) => None,
            Relation::Record(record) => Some(record),
        }
    }
}

/// Two relations are equal when they point at the same record.
impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Email(Email),
    Url(Url),
    Date(DateTime<Utc>),
    File(FileValue),
    Relation(Relation),
    /// A member of a closed value set
    Enum(String),
    Json(serde_json::Value),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Email(_) => "email",
            Value::Url(_) => "url",
            Value::Date(_) => "date",
            Value::File(_) => "file",
            Value::Relation(_) => "relation",
            Value::Enum(_) => "enum",
            Value::Json(_) => "json",
        }
    }

    /// Canonical JSON representation.
    ///
    /// Relations collapse to the target id and stored files to their name.
    /// Pending uploads have no JSON form and yield `None`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;

        Some(match self {
            Value::Text(s) | Value::Enum(s) => Json::String(s.clone()),
            Value::Integer(n) => Json::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Bool(b) => Json::Bool(*b),
            Value::Email(email) => Json::String(email.to_string()),
            Value::Url(url) => Json::String(url.to_string()),
            Value::Date(date) => Json::String(format_datetime(date)),
            Value::File(FileValue::Stored(name)) => Json::String(name.clone()),
            Value::File(FileValue::Upload(_)) => return None,
            Value::Relation(relation) => Json::String(relation.id().to_string()),
            Value::Json(json) => json.clone(),
        })
    }

    /// Serialize any value into an opaque JSON attribute.
    pub fn json<T: Serialize>(value: &T) -> Result<Value> {
        serde_json::to_value(value)
            .map(Value::Json)
            .map_err(|e| Error::Validation(ValidationError::InvalidPayload(e.to_string())))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Email> for Value {
    fn from(value: Email) -> Self {
        Value::Email(value)
    }
}

impl From<Url> for Value {
    fn from(value: Url) -> Self {
        Value::Url(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<FileUpload> for Value {
    fn from(value: FileUpload) -> Self {
        Value::File(FileValue::Upload(value))
    }
}

impl From<FileValue> for Value {
    fn from(value: FileValue) -> Self {
        Value::File(value)
    }
}

impl From<Relation> for Value {
    fn from(value: Relation) -> Self {
        Value::Relation(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

/// Extraction of a Rust value from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(field: &str, value: Value) -> Result<Self>;
}

fn mismatch<T>(field: &str, expected: &str, got: &Value) -> Result<T> {
    Err(Error::mismatch(field, expected, got.type_name()))
}

impl FromValue for Value {
    fn from_value(_field: &str, value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Enum(s) => Ok(s),
            Value::Email(email) => Ok(email.into()),
            Value::Url(url) => Ok(url.into()),
            Value::File(FileValue::Stored(name)) => Ok(name),
            Value::Relation(relation) => Ok(relation.id().to_string()),
            other => mismatch(field, "text", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Integer(n) => Ok(n),
            Value::Float(n) if n.fract() == 0.0 => Ok(n as i64),
            other => mismatch(field, "integer", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Float(n) => Ok(n),
            Value::Integer(n) => Ok(n as f64),
            other => mismatch(field, "float", &other),
        }
    }
}

impl FromValue for bool {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch(field, "bool", &other),
        }
    }
}

impl FromValue for Email {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Email(email) => Ok(email),
            other => mismatch(field, "email", &other),
        }
    }
}

impl FromValue for Url {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Url(url) => Ok(url),
            other => mismatch(field, "url", &other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Date(date) => Ok(date),
            other => mismatch(field, "date", &other),
        }
    }
}

impl FromValue for FileValue {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::File(file) => Ok(file),
            other => mismatch(field, "file", &other),
        }
    }
}

impl FromValue for Relation {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Relation(relation) => Ok(relation),
            Value::Text(id) => Ok(Relation::Id(id)),
            other => mismatch(field, "relation", &other),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value.to_json() {
            Some(json) => Ok(json),
            None => mismatch(field, "json", &value),
        }
    }
}
