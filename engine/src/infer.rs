//! Field inference.
//!
//! Maps a model's declared attributes to the list of remote fields that
//! should back it. The mapping follows a fixed precedence:
//!
//! | signature                               | kind       |
//! |-----------------------------------------|------------|
//! | file, optionally unioned with string    | `file`     |
//! | union with a string (model-or-id)       | `relation` |
//! | string                                  | `text`     |
//! | integer, float                          | `number`   |
//! | bool                                    | `bool`     |
//! | email                                   | `email`    |
//! | url                                     | `url`      |
//! | date/time                               | `date`     |
//! | enum                                    | `select`   |
//! | list, map, object, other unions         | `json`     |
//!
//! Optionality is not part of the kind; it only clears `required`.

use crate::{
    error::Result,
    field::{is_reserved, CREATED, UPDATED},
    model::Attribute,
    Backend, Error, FieldKind, FieldSpec, ModelDescriptor, TypeSignature,
};
use tracing::debug;

/// The kind an attribute with this signature is stored as.
pub fn kind_of(signature: &TypeSignature) -> FieldKind {
    let members = signature.members();

    if let [single] = members.as_slice() {
        return match single {
            TypeSignature::File => FieldKind::File,
            TypeSignature::String => FieldKind::Text,
            TypeSignature::Integer | TypeSignature::Float => FieldKind::Number,
            TypeSignature::Bool => FieldKind::Bool,
            TypeSignature::Email => FieldKind::Email,
            TypeSignature::Url => FieldKind::Url,
            TypeSignature::DateTime => FieldKind::Date,
            TypeSignature::Enum(_) => FieldKind::Select,
            _ => FieldKind::Json,
        };
    }

    if signature.contains(&TypeSignature::File) {
        FieldKind::File
    } else if signature.contains(&TypeSignature::String) {
        FieldKind::Relation
    } else {
        FieldKind::Json
    }
}

/// The two system timestamp fields every collection carries.
pub fn system_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::autodate(CREATED, false),
        FieldSpec::autodate(UPDATED, true),
    ]
}

/// Infer the remote field list for a model.
///
/// The result always starts with `created` and `updated`, followed by one
/// field per declared attribute in declaration order. Relation targets are
/// resolved against the live backend, so inference fails with
/// [`Error::Configuration`] when a target collection cannot be found.
pub fn infer<B: Backend + ?Sized>(
    descriptor: &ModelDescriptor,
    backend: &B,
) -> Result<Vec<FieldSpec>> {
    debug!(model = %descriptor.type_name, "generating fields");

    let mut fields = system_fields();
    for attribute in &descriptor.attributes {
        if is_reserved(&attribute.name) {
            continue;
        }
        let field = infer_attribute(attribute, backend)?;
        debug!(field = %field.name, kind = %field.kind, required = field.required, "inferred field");
        fields.push(field);
    }

    Ok(fields)
}

fn infer_attribute<B: Backend + ?Sized>(attribute: &Attribute, backend: &B) -> Result<FieldSpec> {
    let name = attribute.name.clone();
    let required = attribute.is_required();

    let field = match kind_of(&attribute.signature) {
        FieldKind::File => FieldSpec::file(name, required),
        FieldKind::Select => {
            let values = attribute
                .signature
                .members()
                .into_iter()
                .find_map(|member| match member {
                    TypeSignature::Enum(values) => Some(values.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            FieldSpec::select(name, required, values)
        }
        FieldKind::Relation => {
            let target = attribute.signature.reference().ok_or_else(|| {
                Error::Configuration(format!(
                    "invalid relation configuration for field '{}': no model reference",
                    attribute.name
                ))
            })?;
            let collection = target.collection();
            let remote = backend.get_collection(&collection).map_err(|e| {
                Error::Configuration(format!(
                    "cannot resolve relation target '{collection}' for field '{}': {e}",
                    attribute.name
                ))
            })?;
            debug!(field = %attribute.name, target = %collection, id = %remote.id, "resolved relation");
            FieldSpec::relation(name, required, remote.id)
        }
        kind => FieldSpec::new(name, kind, required),
    };

    Ok(field)
}
