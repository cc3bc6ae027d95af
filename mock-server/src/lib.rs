//! In-memory stand-in for the Microsoft Graph collections the provider
//! manages.
//!
//! # Design
//! Each `MockGraph` owns its own directory behind an `Arc<RwLock<_>>`;
//! clones share it, separate instances never do. The server reproduces the
//! service behaviours the reconciliation core has to cope with:
//!
//! - ids and timestamps are assigned on create, `modifiedDateTime` on patch;
//! - optional collections the client never sent come back as `[]`;
//! - `PATCH` replaces each property it names wholesale, complex-typed ones
//!   included, then answers 204;
//! - failures use the `{"error":{"code","message"}}` envelope;
//! - reads lag behind writes by a configurable number of requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

mod templates;

/// API versions the mock answers under.
pub const API_VERSIONS: &[&str] = &["v1.0", "beta"];

/// Tunables for simulated service behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockConfig {
    /// A created object answers 404 to this many `GET`s before it appears.
    pub create_lag: u32,
    /// A patched object serves its pre-patch body to this many `GET`s.
    pub update_lag: u32,
    /// Maximum members per list page.
    pub page_size: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            create_lag: 0,
            update_lag: 0,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ServerDefault {
    EmptyArray,
    False,
}

/// Server-side rules for one collection.
#[derive(Debug)]
struct CollectionRules {
    path: &'static str,
    writable: bool,
    stamps_times: bool,
    required: &'static [&'static str],
    /// Dotted paths the service fills in when a create omits them. Only
    /// applied when the parent object exists.
    defaults: &'static [(&'static str, ServerDefault)],
}

static POLICIES: CollectionRules = CollectionRules {
    path: "identity/conditionalAccess/policies",
    writable: true,
    stamps_times: true,
    required: &["displayName", "state", "conditions"],
    defaults: &[
        ("conditions.userRiskLevels", ServerDefault::EmptyArray),
        ("conditions.signInRiskLevels", ServerDefault::EmptyArray),
        ("conditions.servicePrincipalRiskLevels", ServerDefault::EmptyArray),
        ("conditions.users.includeUsers", ServerDefault::EmptyArray),
        ("conditions.users.excludeUsers", ServerDefault::EmptyArray),
        ("conditions.users.includeGroups", ServerDefault::EmptyArray),
        ("conditions.users.excludeGroups", ServerDefault::EmptyArray),
        ("conditions.users.includeRoles", ServerDefault::EmptyArray),
        ("conditions.users.excludeRoles", ServerDefault::EmptyArray),
        ("conditions.applications.includeApplications", ServerDefault::EmptyArray),
        ("conditions.applications.excludeApplications", ServerDefault::EmptyArray),
        ("conditions.applications.includeUserActions", ServerDefault::EmptyArray),
        ("grantControls.customAuthenticationFactors", ServerDefault::EmptyArray),
        ("grantControls.termsOfUse", ServerDefault::EmptyArray),
    ],
};

static TEMPLATES: CollectionRules = CollectionRules {
    path: "identity/conditionalAccess/templates",
    writable: false,
    stamps_times: false,
    required: &[],
    defaults: &[],
};

static RESOURCE_OPERATIONS: CollectionRules = CollectionRules {
    path: "deviceManagement/resourceOperations",
    writable: true,
    stamps_times: false,
    required: &["resourceName", "actionName"],
    defaults: &[("enabledForScopeValidation", ServerDefault::False)],
};

static COLLECTIONS: &[&CollectionRules] = &[&POLICIES, &TEMPLATES, &RESOURCE_OPERATIONS];

#[derive(Debug, Clone)]
struct Entry {
    body: Value,
    hidden_reads: u32,
    previous: Option<Value>,
    stale_reads: u32,
}

impl Entry {
    fn visible(body: Value) -> Self {
        Self {
            body,
            hidden_reads: 0,
            previous: None,
            stale_reads: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Directory {
    collections: HashMap<&'static str, BTreeMap<String, Entry>>,
}

impl Directory {
    fn collection(&mut self, path: &'static str) -> &mut BTreeMap<String, Entry> {
        self.collections.entry(path).or_default()
    }
}

/// Handle to one in-memory directory.
#[derive(Debug, Clone)]
pub struct MockGraph {
    directory: Arc<RwLock<Directory>>,
    config: MockConfig,
}

impl MockGraph {
    pub fn new(config: MockConfig) -> Self {
        Self {
            directory: Arc::new(RwLock::new(Directory::default())),
            config,
        }
    }

    /// A directory pre-populated with the conditional access template catalogue.
    pub fn with_default_templates(config: MockConfig) -> Self {
        let mut directory = Directory::default();
        let members = directory.collection(TEMPLATES.path);
        for template in templates::catalogue() {
            let Some(id) = template.get("id").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            members.insert(id, Entry::visible(template));
        }
        Self {
            directory: Arc::new(RwLock::new(directory)),
            config,
        }
    }

    pub fn config(&self) -> MockConfig {
        self.config
    }

    /// Store `body` in `collection` as if it had always existed, returning its id.
    ///
    /// Returns `None` for a collection the mock does not serve.
    pub async fn seed(&self, collection: &str, mut body: Value) -> Option<String> {
        let rules = COLLECTIONS.iter().find(|c| c.path == collection)?;
        let id = match body.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                body.as_object_mut()?.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        self.directory
            .write()
            .await
            .collection(rules.path)
            .insert(id.clone(), Entry::visible(body));
        Some(id)
    }

    /// Current stored body of `id`, bypassing any simulated lag.
    pub async fn snapshot(&self, collection: &str, id: &str) -> Option<Value> {
        self.directory
            .read()
            .await
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|e| e.body.clone())
    }

    pub fn app(&self) -> Router {
        let mut router = Router::new();
        for version in API_VERSIONS {
            for rules in COLLECTIONS {
                router = collection_routes(router, version, *rules);
            }
        }
        router.with_state(self.clone())
    }

    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, config = ?self.config, "mock graph listening");
        }
        axum::serve(listener, self.app()).await
    }
}

fn collection_routes(
    router: Router<MockGraph>,
    version: &str,
    rules: &'static CollectionRules,
) -> Router<MockGraph> {
    let collection_path = format!("/{version}/{}", rules.path);
    let item_path = format!("{collection_path}/{{id}}");

    let list_path = collection_path.clone();
    let list = move |State(mock): State<MockGraph>,
                     Query(query): Query<HashMap<String, String>>,
                     headers: HeaderMap| {
        let path = list_path.clone();
        async move { list_members(mock, rules, &path, query, headers).await }
    };
    let fetch = move |State(mock): State<MockGraph>, Path(id): Path<String>| async move {
        get_member(mock, rules, id).await
    };

    if !rules.writable {
        return router
            .route(&collection_path, get(list))
            .route(&item_path, get(fetch));
    }

    let create = move |State(mock): State<MockGraph>, body: String| async move {
        create_member(mock, rules, body).await
    };
    let patch = move |State(mock): State<MockGraph>, Path(id): Path<String>, body: String| async move {
        patch_member(mock, rules, id, body).await
    };
    let delete = move |State(mock): State<MockGraph>, Path(id): Path<String>| async move {
        delete_member(mock, rules, id).await
    };

    router
        .route(&collection_path, get(list).post(create))
        .route(&item_path, get(fetch).patch(patch).delete(delete))
}

fn graph_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let message = message.into();
    debug!(status = status.as_u16(), code, %message, "answering with error");
    (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
}

fn not_found(id: &str) -> Response {
    graph_error(
        StatusCode::NOT_FOUND,
        "Request_ResourceNotFound",
        format!("Resource '{id}' does not exist or one of its queried reference-property objects are not present."),
    )
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_object(body: &str) -> Result<Map<String, Value>, Response> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(graph_error(
            StatusCode::BAD_REQUEST,
            "BadRequest",
            "Request body must be a JSON object.",
        )),
        Err(e) => Err(graph_error(
            StatusCode::BAD_REQUEST,
            "BadRequest",
            format!("Unable to read JSON request payload: {e}"),
        )),
    }
}

async fn list_members(
    mock: MockGraph,
    rules: &'static CollectionRules,
    path: &str,
    query: HashMap<String, String>,
    headers: HeaderMap,
) -> Response {
    let skip: usize = match query.get("$skiptoken").map(|t| t.parse()) {
        None => 0,
        Some(Ok(skip)) => skip,
        Some(Err(_)) => {
            return graph_error(StatusCode::BAD_REQUEST, "BadRequest", "Invalid $skiptoken.");
        }
    };
    let page_size = mock.config.page_size.max(1);

    let directory = mock.directory.read().await;
    let visible: Vec<&Value> = directory
        .collections
        .get(rules.path)
        .map(|c| c.values().filter(|e| e.hidden_reads == 0).map(|e| &e.body).collect())
        .unwrap_or_default();

    let page: Vec<Value> = visible.iter().skip(skip).take(page_size).map(|v| (*v).clone()).collect();
    let mut out = json!({ "value": page });
    if skip + page_size < visible.len() {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        out["@odata.nextLink"] = Value::String(format!("http://{host}{path}?$skiptoken={}", skip + page_size));
    }
    Json(out).into_response()
}

async fn get_member(mock: MockGraph, rules: &'static CollectionRules, id: String) -> Response {
    let mut directory = mock.directory.write().await;
    let Some(entry) = directory.collection(rules.path).get_mut(&id) else {
        return not_found(&id);
    };
    if entry.hidden_reads > 0 {
        entry.hidden_reads -= 1;
        debug!(%id, remaining = entry.hidden_reads, "hiding newly created object");
        return not_found(&id);
    }
    if entry.stale_reads > 0 {
        entry.stale_reads -= 1;
        if let Some(previous) = &entry.previous {
            debug!(%id, remaining = entry.stale_reads, "serving pre-update body");
            return Json(previous.clone()).into_response();
        }
    }
    Json(entry.body.clone()).into_response()
}

async fn create_member(mock: MockGraph, rules: &'static CollectionRules, body: String) -> Response {
    let mut map = match parse_object(&body) {
        Ok(map) => map,
        Err(response) => return response,
    };
    if let Some(missing) = rules.required.iter().find(|k| !map.contains_key(**k)) {
        return graph_error(
            StatusCode::BAD_REQUEST,
            "BadRequest",
            format!("The property '{missing}' is required."),
        );
    }

    let id = Uuid::new_v4().to_string();
    map.insert("id".to_string(), Value::String(id.clone()));
    if rules.stamps_times {
        let stamp = now();
        map.insert("createdDateTime".to_string(), Value::String(stamp.clone()));
        map.insert("modifiedDateTime".to_string(), Value::String(stamp));
    }
    for (path, default) in rules.defaults {
        apply_default(&mut map, path, *default);
    }

    let body = Value::Object(map);
    let entry = Entry {
        body: body.clone(),
        hidden_reads: mock.config.create_lag,
        previous: None,
        stale_reads: 0,
    };
    mock.directory.write().await.collection(rules.path).insert(id.clone(), entry);
    info!(collection = rules.path, %id, "created");
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn patch_member(mock: MockGraph, rules: &'static CollectionRules, id: String, body: String) -> Response {
    let mut patch = match parse_object(&body) {
        Ok(map) => map,
        Err(response) => return response,
    };
    patch.remove("id");

    let mut directory = mock.directory.write().await;
    let Some(entry) = directory.collection(rules.path).get_mut(&id) else {
        return not_found(&id);
    };
    entry.previous = Some(entry.body.clone());
    entry.stale_reads = mock.config.update_lag;
    if let Value::Object(stored) = &mut entry.body {
        replace_properties(stored, patch);
        for (path, default) in rules.defaults {
            apply_default(stored, path, *default);
        }
        if rules.stamps_times {
            stored.insert("modifiedDateTime".to_string(), Value::String(now()));
        }
    }
    info!(collection = rules.path, %id, "updated");
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_member(mock: MockGraph, rules: &'static CollectionRules, id: String) -> Response {
    let removed = mock.directory.write().await.collection(rules.path).remove(&id);
    match removed {
        Some(_) => {
            info!(collection = rules.path, %id, "deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&id),
    }
}

/// Graph PATCH semantics: a named property, complex-typed or not, is
/// replaced as a whole; properties the patch leaves out are untouched.
fn replace_properties(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

fn apply_default(map: &mut Map<String, Value>, path: &str, default: ServerDefault) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut cursor = map;
    for segment in segments {
        match cursor.get_mut(segment) {
            Some(Value::Object(inner)) => cursor = inner,
            _ => return,
        }
    }
    if !cursor.contains_key(last) {
        let value = match default {
            ServerDefault::EmptyArray => Value::Array(Vec::new()),
            ServerDefault::False => Value::Bool(false),
        };
        cursor.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_replaces_complex_properties_wholesale() {
        let mut stored = json!({
            "displayName": "Admins",
            "state": "enabled",
            "conditions": {
                "clientAppTypes": ["all"],
                "users": { "includeUsers": ["All"], "excludeGroups": ["g1"] }
            }
        });
        let patch = json!({
            "state": "disabled",
            "conditions": { "clientAppTypes": ["all"], "users": { "includeUsers": ["All"] } }
        });
        let (Value::Object(stored_map), Value::Object(patch_map)) = (&mut stored, patch) else {
            unreachable!()
        };
        replace_properties(stored_map, patch_map);
        assert_eq!(
            stored,
            json!({
                "displayName": "Admins",
                "state": "disabled",
                "conditions": { "clientAppTypes": ["all"], "users": { "includeUsers": ["All"] } }
            })
        );
    }

    #[test]
    fn defaults_only_fill_existing_parents() {
        let Value::Object(mut map) = json!({ "conditions": { "users": {} } }) else {
            unreachable!()
        };
        apply_default(&mut map, "conditions.users.excludeGroups", ServerDefault::EmptyArray);
        apply_default(&mut map, "conditions.platforms.includePlatforms", ServerDefault::EmptyArray);
        apply_default(&mut map, "grantControls.termsOfUse", ServerDefault::EmptyArray);
        assert_eq!(
            Value::Object(map),
            json!({ "conditions": { "users": { "excludeGroups": [] } } })
        );
    }

    #[test]
    fn default_catalogue_has_unique_ids() {
        let catalogue = templates::catalogue();
        let mut ids: Vec<&str> = catalogue.iter().filter_map(|t| t["id"].as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(total >= 6);
    }
}
