//! Model descriptors.
//!
//! A [`ModelDescriptor`] is the explicit, compile-time-built registry of a
//! record type's attributes. Typed structs expose theirs through the
//! [`Model`] trait; dynamic callers can build one with the builder methods.

use crate::{error::Result, CollectionName, Record, RecordId};

/// The declared type of a model attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSignature {
    String,
    Integer,
    Float,
    Bool,
    /// A string validated as an email address
    Email,
    /// A string validated as an absolute URL
    Url,
    DateTime,
    /// A binary file attachment
    File,
    /// A closed set of string values
    Enum(Vec<String>),
    /// Another model, embedded or referenced
    Reference(ModelRef),
    List(Box<TypeSignature>),
    Map,
    /// A nested, non-model object
    Object,
    Union(Vec<TypeSignature>),
    Optional(Box<TypeSignature>),
}

impl TypeSignature {
    /// `T | None`
    pub fn optional(inner: TypeSignature) -> Self {
        TypeSignature::Optional(Box::new(inner))
    }

    /// `list[T]`
    pub fn list(inner: TypeSignature) -> Self {
        TypeSignature::List(Box::new(inner))
    }

    /// An enum over the given members.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeSignature::Enum(values.into_iter().map(Into::into).collect())
    }

    /// `M | str`, the "id or object" pattern for relations.
    pub fn relation<M: Model>() -> Self {
        TypeSignature::Union(vec![
            TypeSignature::Reference(ModelRef::of::<M>()),
            TypeSignature::String,
        ])
    }

    /// `File | str`, an attachment that reads back as its stored filename.
    pub fn file_or_name() -> Self {
        TypeSignature::Union(vec![TypeSignature::File, TypeSignature::String])
    }

    /// Whether `None` is an accepted value.
    pub fn is_optional(&self) -> bool {
        match self {
            TypeSignature::Optional(_) => true,
            TypeSignature::Union(members) => members.iter().any(TypeSignature::is_optional),
            _ => false,
        }
    }

    /// The union members with optionality and nested unions flattened away.
    ///
    /// A non-union signature yields itself.
    pub fn members(&self) -> Vec<&TypeSignature> {
        let mut out = Vec::new();
        self.collect_members(&mut out);
        out
    }

    fn collect_members<'a>(&'a self, out: &mut Vec<&'a TypeSignature>) {
        match self {
            TypeSignature::Optional(inner) => inner.collect_members(out),
            TypeSignature::Union(members) => {
                for member in members {
                    member.collect_members(out);
                }
            }
            other => out.push(other),
        }
    }

    /// The first referenced model among the union members, if any.
    pub fn reference(&self) -> Option<&ModelRef> {
        self.members().into_iter().find_map(|member| match member {
            TypeSignature::Reference(target) => Some(target),
            _ => None,
        })
    }

    pub(crate) fn contains(&self, wanted: &TypeSignature) -> bool {
        self.members().into_iter().any(|member| member == wanted)
    }
}

/// A reference to another model type.
///
/// Typed targets are resolved lazily so self-referencing models do not
/// recurse while their descriptor is being built.
#[derive(Debug, Clone)]
pub enum ModelRef {
    /// A collection known only by name
    Named(CollectionName),
    /// A typed model
    Model(fn() -> ModelDescriptor),
}

impl ModelRef {
    /// Reference a typed model.
    pub fn of<M: Model>() -> Self {
        ModelRef::Model(M::descriptor)
    }

    /// Reference a collection by name only.
    pub fn named(collection: impl Into<CollectionName>) -> Self {
        ModelRef::Named(collection.into())
    }

    /// Collection the referenced model lives in.
    pub fn collection(&self) -> CollectionName {
        match self {
            ModelRef::Named(name) => name.clone(),
            ModelRef::Model(build) => build().collection,
        }
    }

    /// The referenced model's descriptor, when known.
    pub fn descriptor(&self) -> Option<ModelDescriptor> {
        match self {
            ModelRef::Named(_) => None,
            ModelRef::Model(build) => Some(build()),
        }
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.collection() == other.collection()
    }
}

/// One declared attribute of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub signature: TypeSignature,
    /// Whether the attribute has a default value
    pub has_default: bool,
}

impl Attribute {
    /// Required iff there is no default and `None` is not accepted.
    pub fn is_required(&self) -> bool {
        !self.has_default && !self.signature.is_optional()
    }
}

/// Metadata for one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Rust type name, used for diagnostics
    pub type_name: String,
    /// Remote collection name
    pub collection: CollectionName,
    /// Declared attributes, in declaration order
    pub attributes: Vec<Attribute>,
}

impl ModelDescriptor {
    /// Start a descriptor whose collection is the pluralized, lowercased
    /// type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let collection = pluralize(&type_name.to_lowercase());
        Self {
            type_name,
            collection,
            attributes: Vec::new(),
        }
    }

    /// Override the collection name.
    pub fn collection(mut self, name: impl Into<CollectionName>) -> Self {
        self.collection = name.into();
        self
    }

    /// Declare an attribute without a default.
    ///
    /// Redeclaring a name replaces the earlier declaration in place.
    pub fn field(self, name: impl Into<String>, signature: TypeSignature) -> Self {
        self.push(name.into(), signature, false)
    }

    /// Declare an attribute that has a default value.
    pub fn field_with_default(self, name: impl Into<String>, signature: TypeSignature) -> Self {
        self.push(name.into(), signature, true)
    }

    fn push(mut self, name: String, signature: TypeSignature, has_default: bool) -> Self {
        let attribute = Attribute {
            name,
            signature,
            has_default,
        };
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Simple English pluralization.
pub fn pluralize(singular: &str) -> String {
    if let Some(stem) = singular.strip_suffix('y') {
        format!("{stem}ies")
    } else if ["s", "sh", "ch", "x", "z"]
        .iter()
        .any(|suffix| singular.ends_with(suffix))
    {
        format!("{singular}es")
    } else {
        format!("{singular}s")
    }
}

/// System-owned fields every record carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Empty until the record has been persisted
    pub id: RecordId,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl RecordMeta {
    /// Whether the record exists remotely.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

/// A strongly-typed record type bound to a remote collection.
pub trait Model: Sized {
    /// The attribute registry for this type.
    fn descriptor() -> ModelDescriptor;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Convert into the engine's record representation.
    fn to_record(&self) -> Record;

    /// Build from a decoded record.
    fn from_record(record: Record) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_rules() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("bus"), "buses");
        assert_eq!(pluralize("brush"), "brushes");
        assert_eq!(pluralize("match"), "matches");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("quiz"), "quizes");
        assert_eq!(pluralize("post"), "posts");
    }

    #[test]
    fn default_collection_name() {
        assert_eq!(ModelDescriptor::new("Example").collection, "examples");
        assert_eq!(ModelDescriptor::new("RelatedModel").collection, "relatedmodels");
        assert_eq!(
            ModelDescriptor::new("RelatedModel")
                .collection("related_models")
                .collection,
            "related_models"
        );
    }

    #[test]
    fn required_flag() {
        let descriptor = ModelDescriptor::new("Thing")
            .field("name", TypeSignature::String)
            .field("nick", TypeSignature::optional(TypeSignature::String))
            .field_with_default("count", TypeSignature::Integer);

        assert!(descriptor.attribute("name").unwrap().is_required());
        assert!(!descriptor.attribute("nick").unwrap().is_required());
        assert!(!descriptor.attribute("count").unwrap().is_required());
    }

    #[test]
    fn redeclaring_replaces_in_place() {
        let descriptor = ModelDescriptor::new("Thing")
            .field("a", TypeSignature::String)
            .field("b", TypeSignature::String)
            .field("a", TypeSignature::Integer);

        assert_eq!(descriptor.attributes.len(), 2);
        assert_eq!(descriptor.attributes[0].name, "a");
        assert_eq!(descriptor.attributes[0].signature, TypeSignature::Integer);
    }

    #[test]
    fn union_members_are_flattened() {
        let sig = TypeSignature::optional(TypeSignature::Union(vec![
            TypeSignature::File,
            TypeSignature::Union(vec![TypeSignature::String]),
        ]));

        assert!(sig.is_optional());
        assert_eq!(
            sig.members(),
            vec![&TypeSignature::File, &TypeSignature::String]
        );
    }

    #[test]
    fn reference_lookup() {
        let sig = TypeSignature::Union(vec![
            TypeSignature::Reference(ModelRef::named("authors")),
            TypeSignature::String,
        ]);
        assert_eq!(sig.reference().unwrap().collection(), "authors");
        assert!(TypeSignature::String.reference().is_none());
        assert!(ModelRef::named("authors").descriptor().is_none());
    }
}
