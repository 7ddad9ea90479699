//! # Tether Engine
//!
//! The schema and record core of a typed PocketBase client.
//!
//! This crate turns strongly-typed record models into remote collection
//! schemas and moves records between their typed form and the backend's
//! JSON form. All remote access goes through the [`Backend`] trait, so the
//! engine itself performs no I/O.
//!
//! ## Core Concepts
//!
//! ### Models
//!
//! A [`ModelDescriptor`] lists a record type's attributes with their
//! [`TypeSignature`]s. Typed structs publish theirs through [`Model`].
//!
//! ### Field Inference
//!
//! [`infer::infer`] maps a descriptor to the ordered list of remote
//! [`FieldSpec`]s: the `created`/`updated` timestamps first, then one field
//! per attribute. Relation fields are bound to the live id of their target
//! collection.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] creates a missing collection or appends the fields an
//! existing one lacks. It never removes, renames or retypes a field, and it
//! refuses to touch the built-in account collections.
//!
//! ### Record Codec
//!
//! [`codec::encode`] and [`codec::decode`] convert between [`Record`] and
//! [`WireRecord`], normalizing the backend's empty-string placeholders and
//! validating every attribute on the way in.
//!
//! ## Quick Start
//!
//! [`MemoryBackend`] is gated behind the `memory` feature, which is on by
//! default.
//!
//! ```rust
//! use tether_engine::{
//!     Context, MemoryBackend, ModelDescriptor, Record, RecordOptions, ReconcileAction,
//!     TypeSignature, Value,
//! };
//!
//! // 1. Describe a model
//! let item = ModelDescriptor::new("Item")
//!     .field("name", TypeSignature::String)
//!     .field_with_default("count", TypeSignature::Integer);
//!
//! // 2. Bring the remote schema in line
//! let backend = MemoryBackend::new();
//! let ctx = Context::new(&backend);
//! let result = ctx.sync_descriptor(&item).unwrap();
//! assert_eq!(result.action, ReconcileAction::Created);
//!
//! // 3. Save and read back a record
//! let mut record = Record::new().with("name", "widget").with("count", 3);
//! ctx.save_record(&item, &mut record).unwrap();
//!
//! let fetched = ctx
//!     .get_record(&item, &record.meta.id, &RecordOptions::default())
//!     .unwrap();
//! assert_eq!(fetched.get("name"), Some(&Value::Text("widget".into())));
//! ```

pub mod backend;
pub mod codec;
pub mod collection;
pub mod context;
pub mod error;
pub mod field;
pub mod infer;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod record;
pub mod value;

// Re-export main types at crate root
pub use backend::{Backend, BackendResult, ListPage, ListQuery, RecordOptions};
pub use collection::{CollectionSpec, RemoteSchema};
pub use context::{Context, Page};
pub use error::{BackendError, Error, ErrorKind, Result, ValidationError};
pub use field::{FieldKind, FieldOptions, FieldSpec};
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryBackend;
pub use model::{Attribute, Model, ModelDescriptor, ModelRef, RecordMeta, TypeSignature};
pub use reconcile::{
    KindConflict, ReconcileAction, ReconcileResult, Reconciler, PROTECTED_COLLECTIONS,
};
pub use record::{Record, WireRecord};
pub use value::{Email, FileUpload, FileValue, FromValue, Relation, Url, Value};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type CollectionId = String;
