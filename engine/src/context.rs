//! The explicit client context.
//!
//! A [`Context`] bundles a backend with the set of protected collections and
//! exposes the model-level operations: schema sync, record CRUD and file
//! access. Nothing is global; every call goes through the backend the
//! context was built with.

use crate::{
    backend::{file_url, ListQuery, RecordOptions},
    codec,
    error::{BackendError, Result},
    infer,
    reconcile::{ReconcileResult, Reconciler},
    Backend, CollectionName, Error, FieldSpec, Model, ModelDescriptor, Record, Value,
};
use tracing::{debug, error};

/// Records fetched per request by [`Context::get_full_list`].
pub const FULL_LIST_BATCH: u32 = 500;

/// One page of decoded records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether a later page holds more records
    pub has_more: bool,
}

/// Handle for model operations against one backend.
pub struct Context<'b, B: Backend + ?Sized> {
    backend: &'b B,
    protected: Vec<CollectionName>,
}

impl<'b, B: Backend + ?Sized> Context<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self {
            backend,
            protected: Vec::new(),
        }
    }

    /// Protect `name` in addition to the built-in account collections.
    pub fn protect(mut self, name: impl Into<CollectionName>) -> Self {
        self.protected.push(name.into());
        self
    }

    pub fn backend(&self) -> &'b B {
        self.backend
    }

    fn reconciler(&self) -> Reconciler<'b, B> {
        self.protected
            .iter()
            .fold(Reconciler::new(self.backend), |r, name| r.protect(name.clone()))
    }

    // ---------------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------------

    /// Infer the remote fields for `M`.
    pub fn infer<M: Model>(&self) -> Result<Vec<FieldSpec>> {
        infer::infer(&M::descriptor(), self.backend)
    }

    /// Create or additively update the collection backing `M`.
    pub fn sync<M: Model>(&self) -> Result<ReconcileResult> {
        self.sync_descriptor(&M::descriptor())
    }

    /// Create or additively update the collection described by `descriptor`.
    ///
    /// Protected collections are rejected before inference, so no remote
    /// call is made for them.
    pub fn sync_descriptor(&self, descriptor: &ModelDescriptor) -> Result<ReconcileResult> {
        let reconciler = self.reconciler();
        reconciler.ensure_unprotected(&descriptor.collection)?;

        let fields = infer::infer(descriptor, self.backend)?;
        reconciler.reconcile(&descriptor.collection, fields)
    }

    /// Drop the collection backing `M` together with its records.
    pub fn delete_collection<M: Model>(&self) -> Result<()> {
        let collection = M::descriptor().collection;
        self.reconciler().ensure_unprotected(&collection)?;

        self.backend.delete_collection(&collection)?;
        debug!(collection = %collection, "collection deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------------

    /// Create or update `model`, refreshing its id and timestamps from the
    /// backend's response.
    pub fn save<M: Model>(&self, model: &mut M) -> Result<()> {
        let mut record = model.to_record();
        record.meta = model.meta().clone();
        self.save_record(&M::descriptor(), &mut record)?;
        *model.meta_mut() = record.meta;
        Ok(())
    }

    /// Create or update a dynamic record.
    ///
    /// The record is normalized in place with [`codec::normalize`] before it
    /// is encoded, so a later read returns an equal record.
    pub fn save_record(&self, descriptor: &ModelDescriptor, record: &mut Record) -> Result<()> {
        codec::normalize(record, descriptor)?;
        let wire = codec::encode(record);
        let collection = &descriptor.collection;

        let sent = if record.meta.is_persisted() {
            self.backend
                .update_record(collection, &record.meta.id, &wire)
        } else {
            self.backend.create_record(collection, &wire)
        };
        let response = sent.map_err(|e| {
            error!(collection = %collection, error = %e, "error saving record");
            Error::Backend(e)
        })?;

        codec::apply_response(&mut record.meta, &response);
        debug!(collection = %collection, id = %record.meta.id, "record saved");
        Ok(())
    }

    /// Fetch one record of `M` by id.
    pub fn get_one<M: Model>(&self, id: &str, options: &RecordOptions) -> Result<M> {
        let record = self.get_record(&M::descriptor(), id, options)?;
        M::from_record(record)
    }

    /// Fetch and decode one dynamic record.
    pub fn get_record(
        &self,
        descriptor: &ModelDescriptor,
        id: &str,
        options: &RecordOptions,
    ) -> Result<Record> {
        let wire = self
            .backend
            .get_record(&descriptor.collection, id, options)?;
        codec::decode(&wire, descriptor)
    }

    /// Fetch one page of `M`.
    pub fn get_list<M: Model>(&self, query: &ListQuery) -> Result<Page<M>> {
        let page = self.list_records(&M::descriptor(), query)?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(M::from_record)
                .collect::<Result<_>>()?,
            has_more: page.has_more,
        })
    }

    /// Fetch and decode one page of dynamic records.
    pub fn list_records(
        &self,
        descriptor: &ModelDescriptor,
        query: &ListQuery,
    ) -> Result<Page<Record>> {
        let page = self.backend.list_records(&descriptor.collection, query)?;
        Ok(Page {
            items: page
                .items
                .iter()
                .map(|wire| codec::decode(wire, descriptor))
                .collect::<Result<_>>()?,
            has_more: page.has_more,
        })
    }

    /// Fetch every record of `M` matching the query's filter and sort,
    /// walking pages of [`FULL_LIST_BATCH`].
    pub fn get_full_list<M: Model>(&self, query: &ListQuery) -> Result<Vec<M>> {
        let descriptor = M::descriptor();
        let mut query = ListQuery {
            page: 1,
            per_page: FULL_LIST_BATCH,
            ..query.clone()
        };

        let mut items = Vec::new();
        loop {
            let page = self.list_records(&descriptor, &query)?;
            for record in page.items {
                items.push(M::from_record(record)?);
            }
            if !page.has_more {
                break;
            }
            query.page += 1;
        }

        debug!(collection = %descriptor.collection, count = items.len(), "fetched full list");
        Ok(items)
    }

    /// Fetch the first record of `M` matching `filter`.
    pub fn get_first_list_item<M: Model>(&self, filter: &str, options: &RecordOptions) -> Result<M> {
        let query = ListQuery {
            options: options.clone(),
            ..ListQuery::page(1, 1).filter(filter)
        };
        let page = self.list_records(&M::descriptor(), &query)?;
        let record = page.items.into_iter().next().ok_or_else(|| {
            Error::Backend(BackendError::NotFound(format!(
                "no record matches '{filter}'"
            )))
        })?;
        M::from_record(record)
    }

    /// Delete `model` remotely.
    pub fn delete<M: Model>(&self, model: &M) -> Result<()> {
        self.delete_by_id::<M>(&model.meta().id)
    }

    pub fn delete_by_id<M: Model>(&self, id: &str) -> Result<()> {
        let collection = M::descriptor().collection;
        self.backend.delete_record(&collection, id)?;
        debug!(collection = %collection, id = %id, "record deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// URL the file stored in `field` of `record` is served from.
    pub fn file_url(
        &self,
        descriptor: &ModelDescriptor,
        record: &Record,
        field: &str,
    ) -> Result<String> {
        let filename = match record.get(field) {
            Some(Value::File(file)) => file
                .stored_name()
                .ok_or_else(|| Error::MissingFile(field.to_string()))?,
            Some(Value::Text(name)) if !name.is_empty() => name.as_str(),
            _ => return Err(Error::MissingFile(field.to_string())),
        };
        if !record.meta.is_persisted() {
            return Err(Error::MissingFile(field.to_string()));
        }
        Ok(file_url(
            self.backend.base_url(),
            &descriptor.collection,
            &record.meta.id,
            filename,
        ))
    }

    /// Download the file stored in `field` of `model`.
    pub fn file_contents<M: Model>(&self, model: &M, field: &str) -> Result<Vec<u8>> {
        let mut record = model.to_record();
        record.meta = model.meta().clone();
        self.record_file_contents(&M::descriptor(), &record, field)
    }

    /// Download the file stored in `field` of a dynamic record.
    pub fn record_file_contents(
        &self,
        descriptor: &ModelDescriptor,
        record: &Record,
        field: &str,
    ) -> Result<Vec<u8>> {
        let url = self.file_url(descriptor, record, field)?;
        self.backend.fetch_file(&url).map_err(|e| {
            error!(url = %url, error = %e, "error fetching file");
            Error::Transfer(e)
        })
    }
}
