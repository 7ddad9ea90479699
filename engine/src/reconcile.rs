//! Schema reconciliation.
//!
//! Aligns a remote collection with the fields inferred for a model. There are
//! exactly two starting states:
//!
//! - **Absent**: the collection does not exist and is created with the full
//!   inferred field list.
//! - **Present**: the collection exists; inferred fields whose names are not
//!   yet present are appended and every existing field is written back
//!   verbatim.
//!
//! The merge is strictly additive. Fields are never removed, renamed or
//! retyped, so running a reconciliation twice changes nothing the second
//! time. The read-then-write merge takes no remote lock; concurrent
//! reconcilers of the same collection must be serialized by the caller.

use crate::{
    error::Result, Backend, CollectionName, CollectionSpec, Error, FieldKind, FieldSpec,
    RemoteSchema,
};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Built-in account collections that reconciliation refuses to touch.
pub const PROTECTED_COLLECTIONS: &[&str] = &["users", "_superusers"];

/// What a reconciliation did to the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The collection was absent and has been created
    Created,
    /// New fields were appended to the existing collection
    Merged { added: Vec<String> },
    /// Every inferred field already existed; nothing was written
    Unchanged,
}

/// An existing field whose remote kind differs from the inferred one.
///
/// The remote kind is kept; the conflict is only reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindConflict {
    pub field: String,
    pub remote: FieldKind,
    pub inferred: FieldKind,
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    /// The remote collection after reconciliation
    pub schema: RemoteSchema,
    pub action: ReconcileAction,
    /// Kind changes that were ignored
    pub conflicts: Vec<KindConflict>,
}

/// The outcome of merging inferred fields into an existing field list.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Existing fields, untouched, followed by the new ones in inference order
    pub fields: Vec<FieldSpec>,
    /// Names of the appended fields
    pub added: Vec<String>,
    pub conflicts: Vec<KindConflict>,
}

/// Compute `existing ∪ (inferred \ names(existing))`.
pub fn merge_fields(existing: &[FieldSpec], inferred: &[FieldSpec]) -> MergePlan {
    let mut fields = existing.to_vec();
    let mut names: HashSet<&str> = existing.iter().map(|f| f.name.as_str()).collect();
    let mut added = Vec::new();
    let mut conflicts = Vec::new();

    for field in inferred {
        if let Some(current) = existing.iter().find(|f| f.name == field.name) {
            if current.kind != field.kind {
                conflicts.push(KindConflict {
                    field: field.name.clone(),
                    remote: current.kind,
                    inferred: field.kind,
                });
            }
            continue;
        }
        if names.insert(field.name.as_str()) {
            added.push(field.name.clone());
            fields.push(field.clone());
        }
    }

    MergePlan {
        fields,
        added,
        conflicts,
    }
}

/// Creates or merges remote collections.
pub struct Reconciler<'a, B: Backend + ?Sized> {
    backend: &'a B,
    protected: Vec<CollectionName>,
}

impl<'a, B: Backend + ?Sized> Reconciler<'a, B> {
    /// Create a reconciler protecting [`PROTECTED_COLLECTIONS`].
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            protected: PROTECTED_COLLECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Additionally protect `name`.
    pub fn protect(mut self, name: impl Into<CollectionName>) -> Self {
        self.protected.push(name.into());
        self
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p == name)
    }

    /// Fail with [`Error::ProtectedCollection`] if `name` is protected.
    pub fn ensure_unprotected(&self, name: &str) -> Result<()> {
        if self.is_protected(name) {
            return Err(Error::ProtectedCollection(name.to_string()));
        }
        Ok(())
    }

    /// Bring the remote collection `name` in line with `inferred`.
    pub fn reconcile(&self, name: &str, inferred: Vec<FieldSpec>) -> Result<ReconcileResult> {
        self.ensure_unprotected(name)?;

        match self.backend.get_collection(name) {
            Ok(existing) => {
                debug!(collection = %name, "collection exists, merging schema");
                self.merge(&existing, &inferred)
            }
            Err(e) if e.is_not_found() => {
                debug!(collection = %name, "collection does not exist, creating");
                self.create(name, inferred)
            }
            Err(e) => {
                error!(collection = %name, error = %e, "error probing collection");
                Err(Error::Reconciliation {
                    collection: name.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Create `name` with exactly `fields`.
    pub fn create(&self, name: &str, fields: Vec<FieldSpec>) -> Result<ReconcileResult> {
        self.ensure_unprotected(name)?;

        let spec = CollectionSpec::base(name, fields);
        let schema = self.backend.create_collection(&spec).map_err(|e| {
            error!(collection = %name, error = %e, "error creating collection");
            Error::Backend(e)
        })?;
        debug!(collection = %name, id = %schema.id, "collection created");

        Ok(ReconcileResult {
            schema,
            action: ReconcileAction::Created,
            conflicts: Vec::new(),
        })
    }

    /// Append the inferred fields `existing` lacks and write the union back.
    pub fn merge(&self, existing: &RemoteSchema, inferred: &[FieldSpec]) -> Result<ReconcileResult> {
        self.ensure_unprotected(&existing.name)?;

        let plan = merge_fields(&existing.fields, inferred);
        for conflict in &plan.conflicts {
            warn!(
                collection = %existing.name,
                field = %conflict.field,
                remote = %conflict.remote,
                inferred = %conflict.inferred,
                "field kind changed; keeping remote kind"
            );
        }

        if plan.added.is_empty() {
            debug!(collection = %existing.name, "schema already up to date");
            return Ok(ReconcileResult {
                schema: existing.clone(),
                action: ReconcileAction::Unchanged,
                conflicts: plan.conflicts,
            });
        }

        let spec = CollectionSpec {
            name: existing.name.clone(),
            collection_type: existing.collection_type.clone(),
            fields: plan.fields,
        };
        let schema = self
            .backend
            .update_collection(&existing.id, &spec)
            .map_err(|e| {
                error!(collection = %existing.name, error = %e, "error updating collection");
                Error::Backend(e)
            })?;
        debug!(collection = %existing.name, added = ?plan.added, "collection updated");

        Ok(ReconcileResult {
            schema,
            action: ReconcileAction::Merged { added: plan.added },
            conflicts: plan.conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BackendError, infer::system_fields, memory::MemoryBackend};

    fn inferred() -> Vec<FieldSpec> {
        let mut fields = system_fields();
        fields.push(FieldSpec::required("name", FieldKind::Text));
        fields.push(FieldSpec::optional("count", FieldKind::Number));
        fields
    }

    #[test]
    fn merge_is_additive() {
        let mut name = FieldSpec::required("name", FieldKind::Text);
        name.id = Some("text001".into());
        name.presentable = true;
        let mut existing = system_fields();
        existing.push(name.clone());

        let plan = merge_fields(&existing, &inferred());

        assert_eq!(plan.added, vec!["count".to_string()]);
        assert_eq!(plan.fields.len(), 4);
        assert_eq!(plan.fields[2], name);
        assert_eq!(plan.fields[3].name, "count");
    }

    #[test]
    fn merge_reports_kind_conflicts() {
        let existing = vec![FieldSpec::optional("count", FieldKind::Text)];
        let inferred = vec![FieldSpec::optional("count", FieldKind::Number)];

        let plan = merge_fields(&existing, &inferred);

        assert!(plan.added.is_empty());
        assert_eq!(plan.fields, existing);
        assert_eq!(
            plan.conflicts,
            vec![KindConflict {
                field: "count".into(),
                remote: FieldKind::Text,
                inferred: FieldKind::Number,
            }]
        );
    }

    #[test]
    fn absent_collection_is_created() {
        let backend = MemoryBackend::new();
        let result = Reconciler::new(&backend).reconcile("items", inferred()).unwrap();

        assert_eq!(result.action, ReconcileAction::Created);
        assert!(result.schema.field("count").is_some());
        assert_eq!(backend.get_collection("items").unwrap(), result.schema);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let backend = MemoryBackend::new();
        let reconciler = Reconciler::new(&backend);

        let first = reconciler.reconcile("items", inferred()).unwrap();
        let writes = backend.call_count();
        let second = reconciler.reconcile("items", inferred()).unwrap();

        assert_eq!(second.action, ReconcileAction::Unchanged);
        assert_eq!(second.schema, first.schema);
        // only the probe
        assert_eq!(backend.call_count(), writes + 1);
    }

    #[test]
    fn protected_collections_fail_fast() {
        let backend = MemoryBackend::new();
        let reconciler = Reconciler::new(&backend).protect("accounts");

        for name in ["users", "_superusers", "accounts"] {
            let err = reconciler.reconcile(name, inferred()).unwrap_err();
            assert_eq!(err, Error::ProtectedCollection(name.to_string()));
        }
        let existing = backend.seed_collection("x", vec![]);
        let users = RemoteSchema {
            name: "users".into(),
            ..existing
        };
        assert!(matches!(
            reconciler.merge(&users, &inferred()),
            Err(Error::ProtectedCollection(_))
        ));
        assert!(matches!(
            reconciler.create("users", inferred()),
            Err(Error::ProtectedCollection(_))
        ));

        // seed_collection does not count as a backend call
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn probe_failure_is_not_treated_as_absent() {
        let backend = MemoryBackend::new();
        backend.fail_next(BackendError::Status {
            status: 500,
            message: "database locked".into(),
        });

        let err = Reconciler::new(&backend)
            .reconcile("items", inferred())
            .unwrap_err();

        assert!(matches!(err, Error::Reconciliation { ref collection, .. } if collection == "items"));
        assert!(backend.get_collection("items").is_err());
    }

    #[test]
    fn create_failure_surfaces_unmodified() {
        let backend = MemoryBackend::new();
        let fields = vec![FieldSpec::relation("owner", true, "pbc_missing".into())];

        let err = Reconciler::new(&backend).reconcile("items", fields).unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Status { status: 400, .. })));
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_kind() -> impl Strategy<Value = FieldKind> {
            prop_oneof![
                Just(FieldKind::Text),
                Just(FieldKind::Number),
                Just(FieldKind::Bool),
                Just(FieldKind::Json),
                Just(FieldKind::Date),
            ]
        }

        fn arb_fields() -> impl Strategy<Value = Vec<FieldSpec>> {
            prop::collection::vec(("[a-f]{1,2}", arb_kind(), any::<bool>()), 0..8).prop_map(
                |specs| {
                    let mut fields: Vec<FieldSpec> = Vec::new();
                    for (name, kind, required) in specs {
                        if fields.iter().all(|f| f.name != name) {
                            fields.push(FieldSpec::new(name, kind, required));
                        }
                    }
                    fields
                },
            )
        }

        proptest! {
            #[test]
            fn prop_merge_keeps_existing_prefix(
                existing in arb_fields(),
                inferred in arb_fields(),
            ) {
                let plan = merge_fields(&existing, &inferred);

                prop_assert_eq!(&plan.fields[..existing.len()], &existing[..]);
                for field in &inferred {
                    prop_assert!(plan.fields.iter().any(|f| f.name == field.name));
                }
                prop_assert_eq!(plan.fields.len(), existing.len() + plan.added.len());
            }

            #[test]
            fn prop_merge_is_idempotent(
                existing in arb_fields(),
                inferred in arb_fields(),
            ) {
                let first = merge_fields(&existing, &inferred);
                let second = merge_fields(&first.fields, &inferred);

                prop_assert!(second.added.is_empty());
                prop_assert_eq!(second.fields, first.fields);
            }
        }
    }
}
