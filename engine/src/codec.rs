//! Record codec.
//!
//! Converts between typed [`Record`]s and the backend's flat [`WireRecord`]
//! representation.
//!
//! Encoding drops the system timestamps, omits absent attributes, passes
//! file uploads through as binary attachments and serializes everything else
//! in its canonical JSON form.
//!
//! Decoding first repairs the backend's quirks (it reports "no file" and
//! other unset optional strings as `""`), then validates every declared
//! attribute. Constructed records go through the same per-kind rules before
//! a write ([`normalize`]), so whatever is saved decodes back to itself.

use crate::{
    error::{Result, ValidationError},
    field::{is_reserved, ID},
    infer::kind_of,
    model::Attribute,
    value::{parse_datetime, Email, FileValue, Relation, Url},
    Error, FieldKind, ModelDescriptor, Record, RecordMeta, TypeSignature, Value, WireRecord,
};
use serde_json::Value as Json;

/// Key under which the backend nests expanded relations.
const EXPAND: &str = "expand";

/// Encode a record for a create or update call.
pub fn encode(record: &Record) -> WireRecord {
    let mut wire = WireRecord::new();
    if record.meta.is_persisted() {
        wire.insert(ID, record.meta.id.clone());
    }

    for (name, value) in record.values() {
        if is_reserved(name) {
            continue;
        }
        match value {
            Value::File(FileValue::Upload(upload)) => wire.attach(name, upload.clone()),
            other => match other.to_json() {
                Some(Json::Null) | None => {}
                Some(json) => wire.insert(name, json),
            },
        }
    }

    wire
}

/// Overwrite a record's system fields from the backend's write response.
pub fn apply_response(meta: &mut RecordMeta, response: &WireRecord) {
    let returned = response.meta();
    if !returned.id.is_empty() {
        meta.id = returned.id;
    }
    meta.created = returned.created;
    meta.updated = returned.updated;
}

/// Decode and validate a raw record against `descriptor`.
pub fn decode(wire: &WireRecord, descriptor: &ModelDescriptor) -> Result<Record> {
    let mut record = Record::new();
    record.meta = wire.meta();

    let expanded = wire.get(EXPAND).and_then(Json::as_object);

    for attribute in &descriptor.attributes {
        if is_reserved(&attribute.name) {
            continue;
        }

        let kind = kind_of(&attribute.signature);
        let Some(raw) = unset_as_none(kind, attribute, wire.get(&attribute.name)) else {
            if attribute.is_required() {
                return Err(Error::missing(&attribute.name));
            }
            continue;
        };

        let value = match (kind, expanded.and_then(|e| e.get(&attribute.name))) {
            (FieldKind::Relation, Some(nested @ Json::Object(_))) => {
                decode_expanded(attribute, nested)?
            }
            _ => decode_value(kind, attribute, raw)?,
        };
        record.set(attribute.name.clone(), value);
    }

    Ok(record)
}

/// Map the backend's representations of "unset" to `None`.
fn unset_as_none<'a>(
    kind: FieldKind,
    attribute: &Attribute,
    raw: Option<&'a Json>,
) -> Option<&'a Json> {
    match raw? {
        Json::Null => None,
        Json::String(s) if s.trim().is_empty() => match kind {
            // the backend stores "no attachment" as an empty string
            FieldKind::File
            | FieldKind::Text
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Date
            | FieldKind::Relation
            | FieldKind::Select => None,
            _ if attribute.is_required() => None,
            _ => raw,
        },
        _ => raw,
    }
}

fn decode_value(kind: FieldKind, attribute: &Attribute, raw: &Json) -> Result<Value> {
    let field = attribute.name.as_str();

    match kind {
        FieldKind::Text | FieldKind::Editor | FieldKind::Password => {
            Ok(Value::Text(expect_str(field, raw, "text")?.trim().to_string()))
        }
        FieldKind::Number => {
            let wants_float = attribute.signature.contains(&TypeSignature::Float);
            let number = raw
                .as_number()
                .ok_or_else(|| Error::mismatch(field, "number", json_type_name(raw)))?;
            if wants_float {
                number
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| Error::mismatch(field, "float", "number"))
            } else {
                integral(number).map(Value::Integer).ok_or_else(|| {
                    let got = match number.as_f64() {
                        Some(n) if n.fract() == 0.0 => "out-of-range integer",
                        _ => "float",
                    };
                    Error::mismatch(field, "integer", got)
                })
            }
        }
        FieldKind::Bool => raw
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| Error::mismatch(field, "bool", json_type_name(raw))),
        FieldKind::Email => {
            let s = expect_str(field, raw, "email")?;
            Email::parse(s)
                .map(Value::Email)
                .map_err(|_| Error::invalid_format(field, "email", s))
        }
        FieldKind::Url => {
            let s = expect_str(field, raw, "url")?;
            Url::parse(s.trim())
                .map(Value::Url)
                .map_err(|_| Error::invalid_format(field, "url", s))
        }
        FieldKind::Date | FieldKind::Autodate => {
            let s = expect_str(field, raw, "date")?;
            parse_datetime(s)
                .map(Value::Date)
                .ok_or_else(|| Error::invalid_format(field, "date", s))
        }
        FieldKind::Select => {
            let s = expect_str(field, raw, "select")?.trim();
            let allowed = enum_values(&attribute.signature);
            if allowed.iter().any(|v| v == s) {
                Ok(Value::Enum(s.to_string()))
            } else {
                Err(Error::Validation(ValidationError::UnknownVariant {
                    field: field.to_string(),
                    value: s.to_string(),
                    allowed,
                }))
            }
        }
        FieldKind::File => {
            let name = expect_str(field, raw, "file")?;
            Ok(Value::File(FileValue::Stored(name.to_string())))
        }
        FieldKind::Relation => {
            let id = expect_str(field, raw, "relation id")?;
            Ok(Value::Relation(Relation::Id(id.trim().to_string())))
        }
        FieldKind::Json | FieldKind::GeoPoint => decode_json(attribute, raw),
    }
}

/// An integer, or an integral float that fits in `i64`.
fn integral(number: &serde_json::Number) -> Option<i64> {
    number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(n))
            .map(|n| n as i64)
    })
}

fn decode_json(attribute: &Attribute, raw: &Json) -> Result<Value> {
    let members = attribute.signature.members();
    let expected = match members.as_slice() {
        [TypeSignature::List(_)] => Some(("list", raw.is_array())),
        [TypeSignature::Map | TypeSignature::Object | TypeSignature::Reference(_)] => {
            Some(("object", raw.is_object()))
        }
        _ => None,
    };
    match expected {
        Some((name, false)) => Err(Error::mismatch(&attribute.name, name, json_type_name(raw))),
        _ => Ok(Value::Json(raw.clone())),
    }
}

fn decode_expanded(attribute: &Attribute, nested: &Json) -> Result<Value> {
    let target = attribute
        .signature
        .reference()
        .and_then(|target| target.descriptor());
    let nested_wire = WireRecord::try_from(nested.clone())?;

    let relation = match target {
        Some(descriptor) => Relation::Record(Box::new(decode(&nested_wire, &descriptor)?)),
        None => Relation::Id(nested_wire.id().to_string()),
    };
    Ok(Value::Relation(relation))
}

/// Check a constructed record against its descriptor before it is written.
///
/// A record passes exactly when [`decode`] would accept its encoded form.
pub fn validate(record: &Record, descriptor: &ModelDescriptor) -> Result<()> {
    conform_all(record, descriptor).map(|_| ())
}

/// Validate a record and rewrite its attributes into the form [`decode`]
/// produces: text trimmed, blank optional strings dropped, relation ids and
/// select values given their typed variants, numbers matched to the
/// declared precision.
///
/// On error the record is left untouched.
pub fn normalize(record: &mut Record, descriptor: &ModelDescriptor) -> Result<()> {
    for (name, value) in conform_all(record, descriptor)? {
        match value {
            Some(value) => record.set(name, value),
            None => {
                record.remove(&name);
            }
        }
    }
    Ok(())
}

fn conform_all(
    record: &Record,
    descriptor: &ModelDescriptor,
) -> Result<Vec<(String, Option<Value>)>> {
    let mut conformed = Vec::new();
    for attribute in &descriptor.attributes {
        if is_reserved(&attribute.name) {
            continue;
        }
        let Some(value) = record.get(&attribute.name) else {
            if attribute.is_required() {
                return Err(Error::missing(&attribute.name));
            }
            continue;
        };
        conformed.push((attribute.name.clone(), conform(attribute, value)?));
    }
    Ok(conformed)
}

/// The value `decode` yields for `value` once it has been encoded, or `None`
/// when the encoded form reads back as unset.
fn conform(attribute: &Attribute, value: &Value) -> Result<Option<Value>> {
    let kind = kind_of(&attribute.signature);

    match (kind, value) {
        // uploads and materialized relations have no lossless JSON form
        (FieldKind::File, Value::File(FileValue::Upload(_)))
        | (FieldKind::Relation, Value::Relation(Relation::Record(_))) => {
            return Ok(Some(value.clone()));
        }
        (_, Value::File(FileValue::Upload(_))) => {
            return Err(Error::mismatch(&attribute.name, kind.as_str(), value.type_name()));
        }
        _ => {}
    }

    let encoded = value.to_json().unwrap_or(Json::Null);
    match unset_as_none(kind, attribute, Some(&encoded)) {
        Some(raw) => decode_value(kind, attribute, raw).map(Some),
        None if attribute.is_required() => Err(Error::missing(&attribute.name)),
        None => Ok(None),
    }
}

fn enum_values(signature: &TypeSignature) -> Vec<String> {
    signature
        .members()
        .into_iter()
        .find_map(|member| match member {
            TypeSignature::Enum(values) => Some(values.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn expect_str<'a>(field: &str, raw: &'a Json, expected: &str) -> Result<&'a str> {
    raw.as_str()
        .ok_or_else(|| Error::mismatch(field, expected, json_type_name(raw)))
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "float",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{value::FileUpload, ModelRef};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("Example")
            .field("title", TypeSignature::String)
            .field("count", TypeSignature::Integer)
            .field_with_default("ratio", TypeSignature::Float)
            .field("active", TypeSignature::Bool)
            .field("site", TypeSignature::Url)
            .field("when", TypeSignature::DateTime)
            .field("options", TypeSignature::list(TypeSignature::String))
            .field("contact", TypeSignature::optional(TypeSignature::Email))
            .field(
                "role",
                TypeSignature::optional(TypeSignature::enumeration(["admin", "regular"])),
            )
            .field(
                "owner",
                TypeSignature::optional(TypeSignature::Union(vec![
                    TypeSignature::Reference(ModelRef::named("owners")),
                    TypeSignature::String,
                ])),
            )
            .field_with_default("photo", TypeSignature::optional(TypeSignature::file_or_name()))
    }

    fn sample() -> Record {
        let mut record = Record::new()
            .with("title", "Test")
            .with("count", 123)
            .with("ratio", 0.5)
            .with("active", true)
            .with("site", Url::parse("http://example.com").unwrap())
            .with("when", Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
            .with("options", json!(["option1", "option2"]))
            .with("contact", Email::parse("test@example.com").unwrap())
            .with("role", Value::Enum("admin".into()))
            .with("owner", Relation::Id("own123".into()));
        record.meta.id = "rec123".into();
        record
    }

    #[test]
    fn encode_canonical_json() {
        let wire = encode(&sample());

        assert_eq!(wire.get("id"), Some(&json!("rec123")));
        assert_eq!(wire.get("count"), Some(&json!(123)));
        assert_eq!(wire.get("site"), Some(&json!("http://example.com/")));
        assert_eq!(wire.get("when"), Some(&json!("2024-05-06T07:08:09+00:00")));
        assert_eq!(wire.get("role"), Some(&json!("admin")));
        assert_eq!(wire.get("owner"), Some(&json!("own123")));
        assert!(wire.get("photo").is_none());
        assert!(!wire.has_files());
    }

    #[test]
    fn encode_skips_system_fields_and_unsaved_id() {
        let record = Record::new()
            .with("title", "x")
            .with("created", Utc::now())
            .with("updated", Utc::now());

        let wire = encode(&record);
        assert_eq!(wire.fields().keys().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn encode_passes_uploads_through() {
        let upload = FileUpload::new("image.png", vec![137, 80, 78, 71]);
        let record = Record::new().with("photo", upload.clone());

        let wire = encode(&record);
        assert!(wire.get("photo").is_none());
        assert_eq!(wire.files().get("photo"), Some(&upload));
    }

    #[test]
    fn encode_relation_object_as_id() {
        let mut owner = Record::new().with("name", "Ann");
        owner.meta.id = "own999".into();
        let record = Record::new().with("owner", Relation::Record(Box::new(owner)));

        assert_eq!(encode(&record).get("owner"), Some(&json!("own999")));
    }

    #[test]
    fn roundtrip_without_files() {
        let record = sample();
        let decoded = decode(&encode(&record), &descriptor()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn empty_file_string_is_absent() {
        let descriptor = ModelDescriptor::new("Profile")
            .field("photo", TypeSignature::optional(TypeSignature::File));
        let wire = WireRecord::new().with("photo", "");

        let record = decode(&wire, &descriptor).unwrap();
        assert!(record.get("photo").is_none());
    }

    #[test]
    fn stored_file_name_decodes() {
        let descriptor = ModelDescriptor::new("Profile")
            .field("photo", TypeSignature::optional(TypeSignature::File));
        let wire = WireRecord::new().with("photo", "me_a1b2c3.png");

        let record = decode(&wire, &descriptor).unwrap();
        assert_eq!(
            record.get("photo"),
            Some(&Value::File(FileValue::Stored("me_a1b2c3.png".into())))
        );
    }

    #[test]
    fn missing_required_field() {
        let mut wire = encode(&sample());
        let mut fields = wire.fields().clone();
        fields.remove("title");
        wire = fields.into();

        let err = decode(&wire, &descriptor()).unwrap_err();
        assert_eq!(err, Error::missing("title"));
    }

    #[test]
    fn empty_required_text_is_missing() {
        let descriptor = ModelDescriptor::new("Note").field("body", TypeSignature::String);
        let err = decode(&WireRecord::new().with("body", "   "), &descriptor).unwrap_err();
        assert_eq!(err, Error::missing("body"));
    }

    #[test]
    fn optional_zero_values_are_absent() {
        let descriptor = ModelDescriptor::new("Contact")
            .field("email", TypeSignature::optional(TypeSignature::Email))
            .field("nick", TypeSignature::optional(TypeSignature::String));
        let wire = WireRecord::new().with("email", "").with("nick", "");

        let record = decode(&wire, &descriptor).unwrap();
        assert_eq!(record.values().count(), 0);
    }

    #[test]
    fn format_validation() {
        let base = encode(&sample());

        let bad_email = base.clone().with("contact", "invalid-email");
        assert!(matches!(
            decode(&bad_email, &descriptor()),
            Err(Error::Validation(ValidationError::InvalidFormat { ref kind, .. })) if kind == "email"
        ));

        let bad_url = base.clone().with("site", "invalid-url");
        assert!(matches!(
            decode(&bad_url, &descriptor()),
            Err(Error::Validation(ValidationError::InvalidFormat { ref kind, .. })) if kind == "url"
        ));

        let bad_date = base.clone().with("when", "not a date");
        assert!(matches!(
            decode(&bad_date, &descriptor()),
            Err(Error::Validation(ValidationError::InvalidFormat { ref kind, .. })) if kind == "date"
        ));

        let bad_count = base.with("count", "many");
        assert!(matches!(
            decode(&bad_count, &descriptor()),
            Err(Error::Validation(ValidationError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn enum_coercion() {
        let base = encode(&sample());

        let ok = decode(&base.clone().with("role", "regular"), &descriptor()).unwrap();
        assert_eq!(ok.get("role"), Some(&Value::Enum("regular".into())));

        let err = decode(&base.with("role", "root"), &descriptor()).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnknownVariant { ref value, .. }) if value == "root"
        ));
    }

    #[test]
    fn backend_timestamps_are_read() {
        let wire = encode(&sample())
            .with("created", "2024-01-01 10:00:00.000Z")
            .with("updated", "2024-01-02 10:00:00.000Z");

        let record = decode(&wire, &descriptor()).unwrap();
        assert_eq!(
            record.meta.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert!(record.get("created").is_none());
    }

    #[test]
    fn apply_response_overwrites_system_fields() {
        let mut meta = RecordMeta::default();
        let response = WireRecord::new()
            .with("id", "new123")
            .with("created", "2024-01-01 10:00:00.000Z")
            .with("updated", "2024-01-01 10:00:00.000Z");

        apply_response(&mut meta, &response);
        assert_eq!(meta.id, "new123");
        assert!(meta.created.is_some());
        assert_eq!(meta.created, meta.updated);
    }

    #[test]
    fn validate_constructed_records() {
        assert!(validate(&sample(), &descriptor()).is_ok());

        let mut missing = sample();
        missing.remove("count");
        assert_eq!(
            validate(&missing, &descriptor()).unwrap_err(),
            Error::missing("count")
        );

        let wrong = sample().with("active", "yes");
        assert!(matches!(
            validate(&wrong, &descriptor()),
            Err(Error::Validation(ValidationError::TypeMismatch { .. }))
        ));

        let bad_role = sample().with("role", "root");
        assert!(matches!(
            validate(&bad_role, &descriptor()),
            Err(Error::Validation(ValidationError::UnknownVariant { .. }))
        ));
    }

    #[test]
    fn validate_applies_decode_rules() {
        let fractional = sample().with("count", 2.5);
        assert_eq!(
            validate(&fractional, &descriptor()).unwrap_err(),
            Error::mismatch("count", "integer", "float")
        );
        assert!(validate(&sample().with("count", 2.0), &descriptor()).is_ok());

        let not_a_list = sample().with("options", "oops");
        assert_eq!(
            validate(&not_a_list, &descriptor()).unwrap_err(),
            Error::mismatch("options", "list", "string")
        );

        let map = ModelDescriptor::new("Settings").field("prefs", TypeSignature::Map);
        let not_a_map = Record::new().with("prefs", json!([1, 2]));
        assert_eq!(
            validate(&not_a_map, &map).unwrap_err(),
            Error::mismatch("prefs", "object", "array")
        );

        let blank = sample().with("title", "   ");
        assert_eq!(validate(&blank, &descriptor()).unwrap_err(), Error::missing("title"));

        let upload = sample().with("title", FileUpload::new("a.txt", b"a".to_vec()));
        assert!(matches!(
            validate(&upload, &descriptor()),
            Err(Error::Validation(ValidationError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn normalize_rewrites_to_decoded_form() {
        let mut record = sample()
            .with("title", " padded ")
            .with("count", 7.0)
            .with("ratio", 1)
            .with("role", "regular")
            .with("owner", "own123")
            .with("contact", "");
        normalize(&mut record, &descriptor()).unwrap();

        assert_eq!(record.get("title"), Some(&Value::Text("padded".into())));
        assert_eq!(record.get("count"), Some(&Value::Integer(7)));
        assert_eq!(record.get("ratio"), Some(&Value::Float(1.0)));
        assert_eq!(record.get("role"), Some(&Value::Enum("regular".into())));
        assert!(matches!(
            record.get("owner"),
            Some(Value::Relation(Relation::Id(id))) if id == "own123"
        ));
        assert!(record.get("contact").is_none());

        let decoded = decode(&encode(&record), &descriptor()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn normalize_failure_leaves_record_untouched() {
        let original = sample().with("title", " padded ").with("count", 2.5);
        let mut record = original.clone();

        assert!(normalize(&mut record, &descriptor()).is_err());
        assert_eq!(record, original);
    }

    #[test]
    fn integral_floats_must_fit() {
        let base = encode(&sample());

        let whole = decode(&base.clone().with("count", 3.0), &descriptor()).unwrap();
        assert_eq!(whole.get("count"), Some(&Value::Integer(3)));

        let huge = decode(&base.with("count", 1e300), &descriptor()).unwrap_err();
        assert_eq!(huge, Error::mismatch("count", "integer", "out-of-range integer"));
    }
}
