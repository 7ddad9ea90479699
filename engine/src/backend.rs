//! The remote backend seam.
//!
//! The engine never talks to the network itself. Everything remote goes
//! through a [`Backend`] handed in by the caller; all calls are blocking and
//! none are retried.

use crate::{error::BackendError, CollectionId, CollectionSpec, RemoteSchema, WireRecord};

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Per-request options for record reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Relation fields to expand, comma separated
    pub expand: Option<String>,
    /// Fields to return, comma separated
    pub fields: Option<String>,
}

impl RecordOptions {
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

/// Parameters for one page of a record listing.
///
/// The filter expression is passed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub options: RecordOptions,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 30,
            filter: None,
            sort: None,
            options: RecordOptions::default(),
        }
    }
}

impl ListQuery {
    /// Page `page` of `per_page` records.
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.options.expand = Some(expand.into());
        self
    }
}

/// One page of raw records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<WireRecord>,
    pub has_more: bool,
}

/// Operations the engine needs from a remote backend.
pub trait Backend {
    /// Base URL files are served from.
    fn base_url(&self) -> &str;

    fn get_collection(&self, name_or_id: &str) -> BackendResult<RemoteSchema>;

    fn create_collection(&self, spec: &CollectionSpec) -> BackendResult<RemoteSchema>;

    fn update_collection(&self, id: &CollectionId, spec: &CollectionSpec)
        -> BackendResult<RemoteSchema>;

    fn delete_collection(&self, name_or_id: &str) -> BackendResult<()>;

    fn get_record(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> BackendResult<WireRecord>;

    fn list_records(&self, collection: &str, query: &ListQuery) -> BackendResult<ListPage>;

    fn create_record(&self, collection: &str, record: &WireRecord) -> BackendResult<WireRecord>;

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        record: &WireRecord,
    ) -> BackendResult<WireRecord>;

    fn delete_record(&self, collection: &str, id: &str) -> BackendResult<()>;

    fn fetch_file(&self, url: &str) -> BackendResult<Vec<u8>>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }

    fn get_collection(&self, name_or_id: &str) -> BackendResult<RemoteSchema> {
        (**self).get_collection(name_or_id)
    }

    fn create_collection(&self, spec: &CollectionSpec) -> BackendResult<RemoteSchema> {
        (**self).create_collection(spec)
    }

    fn update_collection(
        &self,
        id: &CollectionId,
        spec: &CollectionSpec,
    ) -> BackendResult<RemoteSchema> {
        (**self).update_collection(id, spec)
    }

    fn delete_collection(&self, name_or_id: &str) -> BackendResult<()> {
        (**self).delete_collection(name_or_id)
    }

    fn get_record(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> BackendResult<WireRecord> {
        (**self).get_record(collection, id, options)
    }

    fn list_records(&self, collection: &str, query: &ListQuery) -> BackendResult<ListPage> {
        (**self).list_records(collection, query)
    }

    fn create_record(&self, collection: &str, record: &WireRecord) -> BackendResult<WireRecord> {
        (**self).create_record(collection, record)
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        record: &WireRecord,
    ) -> BackendResult<WireRecord> {
        (**self).update_record(collection, id, record)
    }

    fn delete_record(&self, collection: &str, id: &str) -> BackendResult<()> {
        (**self).delete_record(collection, id)
    }

    fn fetch_file(&self, url: &str) -> BackendResult<Vec<u8>> {
        (**self).fetch_file(url)
    }
}

/// Build the URL a stored file is served from. Each path segment is
/// percent-encoded.
pub fn file_url(base_url: &str, collection: &str, record_id: &str, filename: &str) -> String {
    format!(
        "{}/api/files/{}/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(collection),
        urlencoding::encode(record_id),
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_format() {
        assert_eq!(
            file_url("http://127.0.0.1:8090/", "examples", "abc", "image_x1.png"),
            "http://127.0.0.1:8090/api/files/examples/abc/image_x1.png"
        );
    }

    #[test]
    fn file_url_encodes_segments() {
        assert_eq!(
            file_url("http://localhost", "my docs", "a/b", "report #1.pdf"),
            "http://localhost/api/files/my%20docs/a%2Fb/report%20%231.pdf"
        );
    }

    #[test]
    fn list_query_builder() {
        let query = ListQuery::page(2, 5).filter("n >= 10").sort("-created");
        assert_eq!(query.page, 2);
        assert_eq!(query.per_page, 5);
        assert_eq!(query.filter.as_deref(), Some("n >= 10"));
        assert_eq!(query.sort.as_deref(), Some("-created"));
        assert_eq!(ListQuery::default().page, 1);
    }
}
