//! Blocking HTTP backend for a PocketBase server.

use crate::{
    config::Config,
    error::{ClientError, Result},
};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value as Json};
use tether_engine::{
    Backend, BackendResult, CollectionId, CollectionSpec, Context, ListPage, ListQuery,
    RecordOptions, RemoteSchema, WireRecord,
};
use tracing::{debug, error, info};

/// Path of a collection definition.
pub fn collection_path(name_or_id: &str) -> String {
    format!("/api/collections/{}", urlencoding::encode(name_or_id))
}

/// Path of a collection's record listing.
pub fn records_path(collection: &str) -> String {
    format!("{}/records", collection_path(collection))
}

/// Path of one record.
pub fn record_path(collection: &str, id: &str) -> String {
    format!("{}/{}", records_path(collection), urlencoding::encode(id))
}

/// Query string for single-record reads, empty when no option is set.
pub fn record_query(options: &RecordOptions) -> String {
    let params = record_params(options);
    encode_params(&params)
}

/// Query string for one page of a listing.
pub fn list_query(query: &ListQuery) -> String {
    let mut params = vec![
        ("page", query.page.max(1).to_string()),
        ("perPage", query.per_page.max(1).to_string()),
    ];
    if let Some(filter) = &query.filter {
        params.push(("filter", filter.clone()));
    }
    if let Some(sort) = &query.sort {
        params.push(("sort", sort.clone()));
    }
    params.extend(record_params(&query.options));
    encode_params(&params)
}

fn record_params(options: &RecordOptions) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(expand) = &options.expand {
        params.push(("expand", expand.clone()));
    }
    if let Some(fields) = &options.fields {
        params.push(("fields", fields.clone()));
    }
    params
}

fn encode_params(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Listing response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    page: u32,
    #[serde(default)]
    total_pages: i64,
    items: Vec<Map<String, Json>>,
}

impl From<ListResponse> for ListPage {
    fn from(response: ListResponse) -> Self {
        ListPage {
            has_more: i64::from(response.page) < response.total_pages,
            items: response.items.into_iter().map(WireRecord::from).collect(),
        }
    }
}

/// Auth response format.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// A connection to one PocketBase instance.
pub struct PocketBase {
    base_url: String,
    http: Client,
    token: Option<String>,
}

impl PocketBase {
    /// Create an unauthenticated client.
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    /// Create a client and authenticate with the configured credentials,
    /// if any.
    pub fn connect(config: &Config) -> Result<Self> {
        let mut client = Self::new(config)?;
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            client.authenticate(&config.auth_collection, username, password)?;
        }
        Ok(client)
    }

    /// Authenticate against an auth collection with identity and password.
    pub fn authenticate(&mut self, collection: &str, identity: &str, password: &str) -> Result<()> {
        let path = format!("{}/auth-with-password", collection_path(collection));
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "identity": identity, "password": password }));

        let auth: AuthResponse = self.send(request).map_err(|e| match e {
            ClientError::Api { message, .. } => ClientError::Auth(message),
            other => other,
        })?;
        info!(collection = %collection, "authenticated");
        self.token = Some(auth.token);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// A model context bound to this client.
    pub fn context(&self) -> Context<'_, Self> {
        Context::new(self)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        };
        debug!(method = %method, url = %url, "request");

        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.header("Authorization", token),
            None => builder,
        }
    }

    fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let err = ClientError::from_response(status.as_u16(), &body);
        if status != reqwest::StatusCode::NOT_FOUND {
            error!(status = status.as_u16(), error = %err, "request failed");
        }
        Err(err)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.execute(request)?
            .json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        self.execute(request).map(|_| ())
    }

    fn with_record(request: RequestBuilder, record: &WireRecord) -> Result<RequestBuilder> {
        if !record.has_files() {
            return Ok(request.json(record.fields()));
        }

        let mut form = multipart::Form::new();
        for (name, value) in record.fields() {
            let text = match value {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(name.clone(), text);
        }
        for (name, upload) in record.files() {
            let mut part =
                multipart::Part::bytes(upload.data.clone()).file_name(upload.filename.clone());
            if let Some(content_type) = &upload.content_type {
                part = part.mime_str(content_type)?;
            }
            form = form.part(name.clone(), part);
        }
        Ok(request.multipart(form))
    }
}

impl Backend for PocketBase {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_collection(&self, name_or_id: &str) -> BackendResult<RemoteSchema> {
        let request = self.request(Method::GET, &collection_path(name_or_id));
        Ok(self.send(request)?)
    }

    fn create_collection(&self, spec: &CollectionSpec) -> BackendResult<RemoteSchema> {
        let request = self.request(Method::POST, "/api/collections").json(spec);
        Ok(self.send(request)?)
    }

    fn update_collection(
        &self,
        id: &CollectionId,
        spec: &CollectionSpec,
    ) -> BackendResult<RemoteSchema> {
        let request = self.request(Method::PATCH, &collection_path(id)).json(spec);
        Ok(self.send(request)?)
    }

    fn delete_collection(&self, name_or_id: &str) -> BackendResult<()> {
        let request = self.request(Method::DELETE, &collection_path(name_or_id));
        Ok(self.send_empty(request)?)
    }

    fn get_record(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> BackendResult<WireRecord> {
        let path = format!("{}{}", record_path(collection, id), record_query(options));
        let fields: Map<String, Json> = self.send(self.request(Method::GET, &path))?;
        Ok(fields.into())
    }

    fn list_records(&self, collection: &str, query: &ListQuery) -> BackendResult<ListPage> {
        let path = format!("{}{}", records_path(collection), list_query(query));
        let response: ListResponse = self.send(self.request(Method::GET, &path))?;
        Ok(response.into())
    }

    fn create_record(&self, collection: &str, record: &WireRecord) -> BackendResult<WireRecord> {
        let request = Self::with_record(
            self.request(Method::POST, &records_path(collection)),
            record,
        )?;
        let fields: Map<String, Json> = self.send(request)?;
        Ok(fields.into())
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        record: &WireRecord,
    ) -> BackendResult<WireRecord> {
        let request = Self::with_record(
            self.request(Method::PATCH, &record_path(collection, id)),
            record,
        )?;
        let fields: Map<String, Json> = self.send(request)?;
        Ok(fields.into())
    }

    fn delete_record(&self, collection: &str, id: &str) -> BackendResult<()> {
        let request = self.request(Method::DELETE, &record_path(collection, id));
        Ok(self.send_empty(request)?)
    }

    fn fetch_file(&self, url: &str) -> BackendResult<Vec<u8>> {
        let response = self.execute(self.request(Method::GET, url))?;
        let bytes = response.bytes().map_err(ClientError::from)?;
        Ok(bytes.to_vec())
    }
}
