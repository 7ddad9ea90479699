//! In-memory backend.
//!
//! Emulates the remote's collection and record endpoints closely enough to
//! exercise inference, reconciliation and the codec without a network:
//! unique collection names, relation-target checks, required-field checks,
//! zero-value filling, file storage, relation expansion, pagination and a
//! small comparison subset of the filter language.

use crate::{
    backend::{file_url, BackendResult, ListPage, ListQuery, RecordOptions},
    error::BackendError,
    field::{CREATED, ID, UPDATED},
    Backend, CollectionId, CollectionSpec, FieldKind, FieldSpec, RemoteSchema,
    WireRecord,
};
use serde_json::{Map, Value as Json};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

const FILES_PREFIX: &str = "/api/files/";

/// A stored collection and its records, in insertion order.
#[derive(Debug, Clone)]
struct Collection {
    schema: RemoteSchema,
    records: Vec<Map<String, Json>>,
}

#[derive(Debug, Default)]
struct State {
    collections: Vec<Collection>,
    files: HashMap<String, Vec<u8>>,
    next_id: u64,
    calls: usize,
    fail_next: Option<BackendError>,
}

impl State {
    /// Count a backend call and consume an injected failure, if any.
    fn begin(&mut self) -> BackendResult<()> {
        self.calls += 1;
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn collection(&self, name_or_id: &str) -> BackendResult<&Collection> {
        self.collections
            .iter()
            .find(|c| c.schema.name == name_or_id || c.schema.id == name_or_id)
            .ok_or_else(|| BackendError::NotFound(format!("collection '{name_or_id}'")))
    }

    fn collection_mut(&mut self, name_or_id: &str) -> BackendResult<&mut Collection> {
        self.collections
            .iter_mut()
            .find(|c| c.schema.name == name_or_id || c.schema.id == name_or_id)
            .ok_or_else(|| BackendError::NotFound(format!("collection '{name_or_id}'")))
    }

    fn check_fields(&self, fields: &[FieldSpec]) -> BackendResult<()> {
        let mut names = HashSet::new();
        for field in fields {
            if !names.insert(field.name.as_str()) {
                return Err(bad_request(format!("duplicate field name '{}'", field.name)));
            }
            if field.kind == FieldKind::Relation {
                let target = field.options.collection_id.as_deref().unwrap_or_default();
                if !self.collections.iter().any(|c| c.schema.id == target) {
                    return Err(bad_request(format!(
                        "field '{}' references unknown collection '{target}'",
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn assign_field_ids(&mut self, fields: &mut [FieldSpec]) {
        for field in fields.iter_mut().filter(|f| f.id.is_none()) {
            let n = self.next_id();
            field.id = Some(format!("{}{n}", field.kind));
        }
    }
}

/// A [`Backend`] held entirely in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    base_url: String,
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_base_url("http://memory.invalid")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a collection directly, without counting a backend call.
    pub fn seed_collection(&self, name: &str, mut fields: Vec<FieldSpec>) -> RemoteSchema {
        let mut state = self.lock();
        state.assign_field_ids(&mut fields);
        let n = state.next_id();
        let schema = RemoteSchema {
            id: format!("pbc_{n}"),
            name: name.to_string(),
            collection_type: crate::collection::BASE_COLLECTION.to_string(),
            fields,
            extra: Map::new(),
        };
        state.collections.push(Collection {
            schema: schema.clone(),
            records: Vec::new(),
        });
        schema
    }

    /// Number of backend calls served so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Make the next backend call fail with `err`.
    pub fn fail_next(&self, err: BackendError) {
        self.lock().fail_next = Some(err);
    }

    /// Number of records stored in `collection`.
    pub fn record_count(&self, collection: &str) -> usize {
        self.lock()
            .collection(collection)
            .map_or(0, |c| c.records.len())
    }
}

fn bad_request(message: String) -> BackendError {
    BackendError::Status {
        status: 400,
        message,
    }
}

fn now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S%.3fZ")
        .to_string()
}

fn zero_value(kind: FieldKind) -> Json {
    match kind {
        FieldKind::Number => Json::from(0),
        FieldKind::Bool => Json::Bool(false),
        FieldKind::Json => Json::Null,
        _ => Json::String(String::new()),
    }
}

fn is_blank(value: Option<&Json>) -> bool {
    match value {
        None | Some(Json::Null) => true,
        Some(Json::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Merge a write payload into `stored`, storing attachments as files.
fn write_fields(
    schema: &RemoteSchema,
    stored: &mut Map<String, Json>,
    payload: &WireRecord,
    files: &mut HashMap<String, Vec<u8>>,
    base_url: &str,
) {
    let id = stored.get(ID).and_then(Json::as_str).unwrap_or_default().to_string();

    for field in schema.fields.iter().filter(|f| !f.system) {
        if let Some(value) = payload.get(&field.name) {
            stored.insert(field.name.clone(), value.clone());
        }
        if let Some(upload) = payload.files().get(&field.name) {
            let url = file_url(base_url, &schema.name, &id, &upload.filename);
            files.insert(url, upload.data.clone());
            stored.insert(field.name.clone(), Json::String(upload.filename.clone()));
        }
    }
}

fn check_required(schema: &RemoteSchema, stored: &Map<String, Json>) -> BackendResult<()> {
    for field in schema.fields.iter().filter(|f| f.required && !f.system) {
        if is_blank(stored.get(&field.name)) {
            return Err(bad_request(format!("field '{}' cannot be blank", field.name)));
        }
    }
    Ok(())
}

impl Backend for MemoryBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_collection(&self, name_or_id: &str) -> BackendResult<RemoteSchema> {
        let mut state = self.lock();
        state.begin()?;
        state.collection(name_or_id).map(|c| c.schema.clone())
    }

    fn create_collection(&self, spec: &CollectionSpec) -> BackendResult<RemoteSchema> {
        let mut state = self.lock();
        state.begin()?;

        if spec.name.is_empty() {
            return Err(bad_request("collection name is required".into()));
        }
        if state.collection(&spec.name).is_ok() {
            return Err(bad_request(format!("collection '{}' already exists", spec.name)));
        }
        state.check_fields(&spec.fields)?;

        let mut fields = spec.fields.clone();
        state.assign_field_ids(&mut fields);
        let n = state.next_id();
        let schema = RemoteSchema {
            id: format!("pbc_{n}"),
            name: spec.name.clone(),
            collection_type: spec.collection_type.clone(),
            fields,
            extra: Map::new(),
        };
        state.collections.push(Collection {
            schema: schema.clone(),
            records: Vec::new(),
        });
        Ok(schema)
    }

    fn update_collection(
        &self,
        id: &CollectionId,
        spec: &CollectionSpec,
    ) -> BackendResult<RemoteSchema> {
        let mut state = self.lock();
        state.begin()?;

        let taken = state
            .collections
            .iter()
            .any(|c| c.schema.name == spec.name && &c.schema.id != id);
        if taken {
            return Err(bad_request(format!("collection '{}' already exists", spec.name)));
        }
        state.check_fields(&spec.fields)?;

        let mut fields = spec.fields.clone();
        state.assign_field_ids(&mut fields);
        let collection = state.collection_mut(id)?;
        collection.schema.name = spec.name.clone();
        collection.schema.fields = fields;
        Ok(collection.schema.clone())
    }

    fn delete_collection(&self, name_or_id: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.begin()?;

        let id = state.collection(name_or_id)?.schema.id.clone();
        let referenced = state.collections.iter().any(|c| {
            c.schema.id != id
                && c.schema
                    .fields
                    .iter()
                    .any(|f| f.options.collection_id.as_deref() == Some(id.as_str()))
        });
        if referenced {
            return Err(bad_request(format!(
                "collection '{name_or_id}' is referenced by another collection"
            )));
        }
        state.collections.retain(|c| c.schema.id != id);
        Ok(())
    }

    fn get_record(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> BackendResult<WireRecord> {
        let mut state = self.lock();
        state.begin()?;

        let stored = state.collection(collection)?;
        let record = stored
            .records
            .iter()
            .find(|r| r.get(ID).and_then(Json::as_str) == Some(id))
            .ok_or_else(|| BackendError::NotFound(format!("record '{id}' in '{collection}'")))?;

        let mut record = record.clone();
        if let Some(expand) = &options.expand {
            expand_relations(&state, &stored.schema, &mut record, expand);
        }
        Ok(record.into())
    }

    fn list_records(&self, collection: &str, query: &ListQuery) -> BackendResult<ListPage> {
        let mut state = self.lock();
        state.begin()?;

        let stored = state.collection(collection)?;
        let filter = match &query.filter {
            Some(expr) if !expr.trim().is_empty() => Filter::parse(expr)?,
            _ => Filter::default(),
        };

        let mut matching: Vec<&Map<String, Json>> =
            stored.records.iter().filter(|r| filter.matches(r)).collect();
        if let Some(sort) = &query.sort {
            sort_records(&mut matching, sort);
        }

        let per_page = query.per_page.max(1) as usize;
        let start = (query.page.max(1) as usize - 1) * per_page;
        let mut items = Vec::new();
        for record in matching.iter().skip(start).take(per_page) {
            let mut record = (*record).clone();
            if let Some(expand) = &query.options.expand {
                expand_relations(&state, &stored.schema, &mut record, expand);
            }
            items.push(record.into());
        }

        Ok(ListPage {
            items,
            has_more: matching.len() > start + per_page,
        })
    }

    fn create_record(&self, collection: &str, record: &WireRecord) -> BackendResult<WireRecord> {
        let mut state = self.lock();
        state.begin()?;

        let n = state.next_id();
        let schema = state.collection(collection)?.schema.clone();
        let id = match record.id() {
            "" => format!("{n:015}"),
            given => given.to_string(),
        };
        let timestamp = now();

        let mut stored = Map::new();
        stored.insert(ID.into(), Json::String(id));
        for field in schema.fields.iter().filter(|f| !f.system) {
            stored.insert(field.name.clone(), zero_value(field.kind));
        }
        let State { files, .. } = &mut *state;
        write_fields(&schema, &mut stored, record, files, &self.base_url);
        check_required(&schema, &stored)?;
        stored.insert(CREATED.into(), Json::String(timestamp.clone()));
        stored.insert(UPDATED.into(), Json::String(timestamp));
        stored.insert("collectionId".into(), Json::String(schema.id.clone()));
        stored.insert("collectionName".into(), Json::String(schema.name.clone()));

        state.collection_mut(collection)?.records.push(stored.clone());
        Ok(stored.into())
    }

    fn update_record(
        &self,
        collection: &str,
        id: &str,
        record: &WireRecord,
    ) -> BackendResult<WireRecord> {
        let mut state = self.lock();
        state.begin()?;

        let schema = state.collection(collection)?.schema.clone();
        let mut stored = state
            .collection(collection)?
            .records
            .iter()
            .find(|r| r.get(ID).and_then(Json::as_str) == Some(id))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("record '{id}' in '{collection}'")))?;

        let State { files, .. } = &mut *state;
        write_fields(&schema, &mut stored, record, files, &self.base_url);
        check_required(&schema, &stored)?;
        stored.insert(UPDATED.into(), Json::String(now()));

        let target = state
            .collection_mut(collection)?
            .records
            .iter_mut()
            .find(|r| r.get(ID).and_then(Json::as_str) == Some(id));
        if let Some(target) = target {
            *target = stored.clone();
        }
        Ok(stored.into())
    }

    fn delete_record(&self, collection: &str, id: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.begin()?;

        let stored = state.collection_mut(collection)?;
        let before = stored.records.len();
        stored
            .records
            .retain(|r| r.get(ID).and_then(Json::as_str) != Some(id));
        if stored.records.len() == before {
            return Err(BackendError::NotFound(format!(
                "record '{id}' in '{collection}'"
            )));
        }
        Ok(())
    }

    fn fetch_file(&self, url: &str) -> BackendResult<Vec<u8>> {
        let mut state = self.lock();
        state.begin()?;

        if !url.contains(FILES_PREFIX) {
            return Err(BackendError::Transport(format!("unsupported url '{url}'")));
        }
        state
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("file '{url}'")))
    }
}

/// Nest related records under `expand` for the requested relation fields.
fn expand_relations(
    state: &State,
    schema: &RemoteSchema,
    record: &mut Map<String, Json>,
    expand: &str,
) {
    let mut expanded = Map::new();
    for name in expand.split(',').map(str::trim) {
        let Some(field) = schema.field(name) else {
            continue;
        };
        let (Some(target), Some(id)) = (
            field.options.collection_id.as_deref(),
            record.get(name).and_then(Json::as_str),
        ) else {
            continue;
        };
        let related = state.collection(target).ok().and_then(|c| {
            c.records
                .iter()
                .find(|r| r.get(ID).and_then(Json::as_str) == Some(id))
        });
        if let Some(related) = related {
            expanded.insert(name.to_string(), Json::Object(related.clone()));
        }
    }
    if !expanded.is_empty() {
        record.insert("expand".into(), Json::Object(expanded));
    }
}

fn sort_records(records: &mut [&Map<String, Json>], sort: &str) {
    let (field, descending) = match sort.trim().strip_prefix('-') {
        Some(field) => (field, true),
        None => (sort.trim().trim_start_matches('+'), false),
    };
    records.sort_by(|a, b| {
        let ordering = compare_json(a.get(field), b.get(field));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare_json(a: Option<&Json>, b: Option<&Json>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    field: String,
    op: Op,
    literal: Json,
}

/// A conjunction of `field <op> literal` comparisons.
#[derive(Debug, Clone, Default, PartialEq)]
struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    fn parse(expr: &str) -> BackendResult<Self> {
        const OPS: [(&str, Op); 7] = [
            (">=", Op::Ge),
            ("<=", Op::Le),
            ("!=", Op::Ne),
            ("=", Op::Eq),
            (">", Op::Gt),
            ("<", Op::Lt),
            ("~", Op::Like),
        ];

        let mut clauses = Vec::new();
        for part in expr.split("&&") {
            let (field, op, literal) = OPS
                .iter()
                .find_map(|(token, op)| {
                    part.split_once(token)
                        .map(|(field, literal)| (field.trim(), *op, literal.trim()))
                })
                .ok_or_else(|| bad_request(format!("invalid filter expression '{expr}'")))?;
            if field.is_empty() || literal.is_empty() {
                return Err(bad_request(format!("invalid filter expression '{expr}'")));
            }
            clauses.push(Clause {
                field: field.to_string(),
                op,
                literal: parse_literal(literal),
            });
        }
        Ok(Self { clauses })
    }

    fn matches(&self, record: &Map<String, Json>) -> bool {
        self.clauses.iter().all(|clause| {
            let actual = record.get(&clause.field).unwrap_or(&Json::Null);
            let ordering = compare_json(Some(actual), Some(&clause.literal));
            match clause.op {
                Op::Eq => actual == &clause.literal,
                Op::Ne => actual != &clause.literal,
                Op::Gt => ordering.is_gt() && comparable(actual, &clause.literal),
                Op::Ge => ordering.is_ge() && comparable(actual, &clause.literal),
                Op::Lt => ordering.is_lt() && comparable(actual, &clause.literal),
                Op::Le => ordering.is_le() && comparable(actual, &clause.literal),
                Op::Like => match (actual, &clause.literal) {
                    (Json::String(a), Json::String(b)) => a.contains(b.as_str()),
                    _ => false,
                },
            }
        })
    }
}

fn comparable(a: &Json, b: &Json) -> bool {
    matches!(
        (a, b),
        (Json::Number(_), Json::Number(_)) | (Json::String(_), Json::String(_))
    )
}

fn parse_literal(raw: &str) -> Json {
    let quoted = ['\'', '"']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q)));
    if let Some(s) = quoted {
        return Json::String(s.to_string());
    }
    match raw {
        "true" => Json::Bool(true),
        "false" => Json::Bool(false),
        "null" => Json::Null,
        _ => raw
            .parse::<i64>()
            .map(Json::from)
            .or_else(|_| raw.parse::<f64>().map(Json::from))
            .unwrap_or_else(|_| Json::String(raw.to_string())),
    }
}
