//! In-memory ERS node
//!
//! Serves the three TrustSec collections with the same envelopes as the real
//! API: paged `SearchResult` listings with a `link` on every summary, detail
//! bodies wrapped under the object name, `ERSResponse` error messages, and
//! name uniqueness on create. Failures can be injected per page, per
//! resource or for the whole node, and the peak number of requests in flight
//! is recorded so tests can check the connection bound.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use trustsec_common::endpoints::{envelope, REST_PAGE_SIZE_DEFAULT, VERSION_PATH};
use trustsec_common::{Collection, ErsError, ErsResponse, ErsResult, ErsTransport};

/// One request seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// HTTP method
    pub method: String,
    /// Path including query string
    pub path: String,
}

#[derive(Default)]
struct FakeCollection {
    /// Objects in insertion order
    items: Vec<Map<String, Value>>,
    /// Ids that refuse deletion
    protected: HashSet<String>,
}

#[derive(Default)]
struct Failures {
    /// (collection, page) -> status
    pages: HashMap<(Collection, usize), u16>,
    /// Resource ids whose detail GET fails
    details: HashSet<String>,
    /// Names whose create is rejected with 500
    creates: HashSet<String>,
    /// Ids whose delete is rejected with 500
    deletes: HashSet<String>,
    /// Every request fails at the transport level
    unreachable: bool,
}

#[derive(Default)]
struct State {
    collections: HashMap<Collection, FakeCollection>,
    failures: Failures,
    log: Vec<RequestRecord>,
    version: Option<(String, String)>,
}

/// In-memory ERS node implementing [`ErsTransport`]
pub struct FakeErsServer {
    state: Mutex<State>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for FakeErsServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeErsServer {
    /// Create an empty node
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            latency: Duration::from_millis(1),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Set the simulated per-request latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert an object directly, bypassing create validation.
    ///
    /// Assigns an `id` when missing and returns it.
    pub fn insert(&self, collection: Collection, object: Value) -> String {
        let mut object = match object {
            Value::Object(map) => map,
            other => panic!("fake objects must be JSON objects, got {}", other),
        };
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        object.insert("id".into(), Value::String(id.clone()));
        object
            .entry("generationId")
            .or_insert_with(|| Value::String("0".into()));

        self.state
            .lock()
            .collections
            .entry(collection)
            .or_default()
            .items
            .push(object);
        id
    }

    /// Insert an object that refuses deletion (platform default)
    pub fn insert_protected(&self, collection: Collection, object: Value) -> String {
        let id = self.insert(collection, object);
        self.state
            .lock()
            .collections
            .entry(collection)
            .or_default()
            .protected
            .insert(id.clone());
        id
    }

    /// All objects of a collection, in insertion order
    pub fn items(&self, collection: Collection) -> Vec<Value> {
        self.state
            .lock()
            .collections
            .get(&collection)
            .map(|c| c.items.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Number of objects in a collection
    pub fn len(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .collections
            .get(&collection)
            .map_or(0, |c| c.items.len())
    }

    /// Returns true if the collection is empty
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Find an object by name
    pub fn find_by_name(&self, collection: Collection, name: &str) -> Option<Value> {
        self.items(collection)
            .into_iter()
            .find(|o| o.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Id of the named object
    pub fn id_of(&self, collection: Collection, name: &str) -> Option<String> {
        self.find_by_name(collection, name)
            .and_then(|o| o.get("id").and_then(Value::as_str).map(str::to_string))
    }

    /// Make one listing page answer with `status`
    pub fn fail_page(&self, collection: Collection, page: usize, status: u16) {
        self.state
            .lock()
            .failures
            .pages
            .insert((collection, page), status);
    }

    /// Make the detail GET of `id` answer 500
    pub fn fail_detail(&self, id: impl Into<String>) {
        self.state.lock().failures.details.insert(id.into());
    }

    /// Make the create of `name` answer 500
    pub fn fail_create(&self, name: impl Into<String>) {
        self.state.lock().failures.creates.insert(name.into());
    }

    /// Make the delete of `id` answer 500
    pub fn fail_delete(&self, id: impl Into<String>) {
        self.state.lock().failures.deletes.insert(id.into());
    }

    /// Fail every request at the transport level
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().failures.unreachable = unreachable;
    }

    /// Serve the node version operation
    pub fn set_version(&self, version: impl Into<String>, patch: impl Into<String>) {
        self.state.lock().version = Some((version.into(), patch.into()));
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().log.clone()
    }

    /// Number of requests with `method` whose path starts with `prefix`
    pub fn count(&self, method: &str, prefix: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    /// Highest number of requests observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, method: &str, path: &str) -> ErsResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.log.push(RequestRecord {
            method: method.to_string(),
            path: path.to_string(),
        });
        if state.failures.unreachable {
            return Err(ErsError::transport(method, path, "connection refused"));
        }
        Ok(())
    }

    fn handle_get(&self, path: &str) -> ErsResponse {
        let (base, query) = split_query(path);

        if base == VERSION_PATH {
            return self.version_response();
        }

        if let Some(collection) = collection_for(base) {
            return self.list(collection, &query);
        }

        match split_item(base) {
            Some((collection, id)) => self.detail(collection, id),
            None => not_found(base),
        }
    }

    fn list(&self, collection: Collection, query: &HashMap<String, usize>) -> ErsResponse {
        let size = query.get("size").copied().unwrap_or(REST_PAGE_SIZE_DEFAULT);
        let page = query.get("page").copied().unwrap_or(1).max(1);

        let state = self.state.lock();
        if let Some(&status) = state.failures.pages.get(&(collection, page)) {
            return error_response(status, "Internal error");
        }

        let items = state
            .collections
            .get(&collection)
            .map(|c| c.items.as_slice())
            .unwrap_or(&[]);
        let total = items.len();
        let resources: Vec<Value> = items
            .iter()
            .skip((page - 1) * size)
            .take(size)
            .map(|o| summary(collection, o))
            .collect();

        ErsResponse::new(
            200,
            json!({ envelope::SEARCH_RESULT: { envelope::TOTAL: total, envelope::RESOURCES: resources } }),
        )
    }

    fn detail(&self, collection: Collection, id: &str) -> ErsResponse {
        let state = self.state.lock();
        if state.failures.details.contains(id) {
            return error_response(500, "Internal error");
        }
        let found = state
            .collections
            .get(&collection)
            .and_then(|c| c.items.iter().find(|o| has_id(o, id)));

        match found {
            Some(object) => {
                let mut object = object.clone();
                object.insert(envelope::LINK.into(), link(collection, id));
                ErsResponse::new(200, json!({ collection.object_name(): object }))
            }
            None => not_found(id),
        }
    }

    fn create(&self, path: &str, body: &Value) -> ErsResponse {
        let Some(collection) = collection_for(path) else {
            return not_found(path);
        };
        let Some(object) = body.get(collection.object_name()).and_then(Value::as_object) else {
            return error_response(
                400,
                &format!("Body must wrap a {} object", collection.object_name()),
            );
        };
        let Some(name) = object.get("name").and_then(Value::as_str).map(str::to_string) else {
            return error_response(400, "name is a required attribute");
        };

        let mut state = self.state.lock();
        if state.failures.creates.contains(&name) {
            return error_response(500, &format!("CRUD operation exception for {}", name));
        }

        let entry = state.collections.entry(collection).or_default();
        if entry
            .items
            .iter()
            .any(|o| o.get("name").and_then(Value::as_str) == Some(name.as_str()))
        {
            return error_response(
                400,
                &format!(
                    "{} with name {} already exists",
                    collection.object_name(),
                    name
                ),
            );
        }

        let mut object = object.clone();
        object.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        object.insert("generationId".into(), Value::String("0".into()));
        entry.items.push(object);
        ErsResponse::new(201, Value::Null)
    }

    fn remove(&self, path: &str) -> ErsResponse {
        let Some((collection, id)) = split_item(path) else {
            return not_found(path);
        };

        let mut state = self.state.lock();
        if state.failures.deletes.contains(id) {
            return error_response(500, &format!("Failed to delete {}", id));
        }
        let Some(entry) = state.collections.get_mut(&collection) else {
            return not_found(id);
        };
        if entry.protected.contains(id) {
            return error_response(
                400,
                &format!("{} {} is read-only", collection.object_name(), id),
            );
        }
        match entry.items.iter().position(|o| has_id(o, id)) {
            Some(index) => {
                entry.items.remove(index);
                ErsResponse::new(204, Value::Null)
            }
            None => not_found(id),
        }
    }

    fn version_response(&self) -> ErsResponse {
        let state = self.state.lock();
        match &state.version {
            Some((version, patch)) => ErsResponse::new(
                200,
                json!({
                    envelope::OPERATION_RESULT: {
                        "resultValue": [
                            { "name": "version", "value": version },
                            { "name": "patch information", "value": patch },
                        ]
                    }
                }),
            ),
            None => not_found(VERSION_PATH),
        }
    }
}

#[async_trait]
impl ErsTransport for FakeErsServer {
    async fn get(&self, path: &str) -> ErsResult<ErsResponse> {
        self.enter("GET", path).await?;
        Ok(self.handle_get(path))
    }

    async fn post(&self, path: &str, body: &Value) -> ErsResult<ErsResponse> {
        self.enter("POST", path).await?;
        Ok(self.create(path, body))
    }

    async fn delete(&self, path: &str) -> ErsResult<ErsResponse> {
        self.enter("DELETE", path).await?;
        Ok(self.remove(path))
    }
}

fn split_query(path: &str) -> (&str, HashMap<String, usize>) {
    match path.split_once('?') {
        Some((base, query)) => {
            let params = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .filter_map(|(k, v)| v.parse().ok().map(|v| (k.to_string(), v)))
                .collect();
            (base, params)
        }
        None => (path, HashMap::new()),
    }
}

fn collection_for(path: &str) -> Option<Collection> {
    Collection::CREATE_ORDER
        .into_iter()
        .find(|c| c.path() == path)
}

fn split_item(path: &str) -> Option<(Collection, &str)> {
    let (base, id) = path.rsplit_once('/')?;
    collection_for(base).map(|c| (c, id))
}

fn has_id(object: &Map<String, Value>, id: &str) -> bool {
    object.get("id").and_then(Value::as_str) == Some(id)
}

fn link(collection: Collection, id: &str) -> Value {
    json!({
        "rel": "self",
        "href": format!("https://ise.fake:9060{}", collection.item_path(id)),
        "type": "application/json",
    })
}

fn summary(collection: Collection, object: &Map<String, Value>) -> Value {
    let id = object.get("id").and_then(Value::as_str).unwrap_or_default();
    let mut out = Map::new();
    for key in ["id", "name", "description"] {
        if let Some(value) = object.get(key) {
            out.insert(key.into(), value.clone());
        }
    }
    out.insert(envelope::LINK.into(), link(collection, id));
    Value::Object(out)
}

fn error_response(status: u16, title: &str) -> ErsResponse {
    ErsResponse::new(
        status,
        json!({
            envelope::ERS_RESPONSE: {
                "messages": [{ "title": title, "type": "ERROR" }]
            }
        }),
    )
}

fn not_found(what: &str) -> ErsResponse {
    error_response(404, &format!("Resource {} not found", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_pages_and_links() {
        let server = FakeErsServer::new();
        for i in 0..5 {
            server.insert(Collection::Tag, json!({ "name": format!("T{}", i), "value": i + 3 }));
        }

        let page = server
            .get(&Collection::Tag.page_path(2, 3))
            .await
            .unwrap();
        let result = &page.body["SearchResult"];
        assert_eq!(result["total"], 5);
        assert_eq!(result["resources"].as_array().unwrap().len(), 1);
        assert!(result["resources"][0].get("link").is_some());
    }

    #[tokio::test]
    async fn test_create_duplicate_rejected() {
        let server = FakeErsServer::new();
        let body = json!({ "Sgt": { "name": "Guests", "value": 6 } });
        let first = server.post(Collection::Tag.path(), &body).await.unwrap();
        let second = server.post(Collection::Tag.path(), &body).await.unwrap();
        assert_eq!(first.status, 201);
        assert_eq!(second.status, 400);
        assert_eq!(server.len(Collection::Tag), 1);
    }

    #[tokio::test]
    async fn test_delete_protected_and_missing() {
        let server = FakeErsServer::new();
        let id = server.insert_protected(Collection::Acl, json!({ "name": "Permit IP" }));
        let protected = server.delete(&Collection::Acl.item_path(&id)).await.unwrap();
        let missing = server.delete(&Collection::Acl.item_path("nope")).await.unwrap();
        assert_eq!(protected.status, 400);
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let server = FakeErsServer::new();
        server.set_unreachable(true);
        assert!(server.get(Collection::Tag.path()).await.is_err());
        assert_eq!(server.requests().len(), 1);
    }
}
