//! An HTTP stand-in for the document service.
//!
//! Serves the subset of the REST API the client uses, checks each request's
//! master-key signature against the decoded resource link, and records every
//! request for assertions. Queries are paged but not filtered: every document
//! in the collection matches.
//!
//! The account has two regions on the same port: "West US" at `127.0.0.1`,
//! which takes writes, and the read-only "Japan East" at `localhost`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use helios_docdb::client::auth::MasterKey;
use helios_docdb::{
    ConnectionMode, ConnectionPolicy, Protocol, RepositoryConfig, RestDocumentClient,
};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde_json::{Value, json};
use url::Url;

/// A request as the fake service received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Decoded resource path, e.g. `dbs/ToDoList/colls/Items/docs/a b`.
    pub path: String,
    /// Path exactly as it arrived on the wire.
    pub raw_path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Host name the request was addressed to, without the port.
    pub fn host(&self) -> &str {
        let host = self.header("host").unwrap_or_default();
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    write_url: String,
    read_url: String,
    databases: Vec<String>,
    collections: BTreeMap<String, Option<String>>,
    documents: BTreeMap<String, Vec<Value>>,
    throttle_remaining: u32,
    requests: Vec<RecordedRequest>,
    next_rid: u64,
}

type Shared = Arc<(MasterKey, Mutex<FakeState>)>;

/// A running fake service.
pub struct FakeService {
    /// Account endpoint, also the "West US" write region.
    pub base_url: Url,
    /// Endpoint of the read-only "Japan East" region.
    pub read_region_url: Url,
    shared: Shared,
}

impl FakeService {
    /// Starts a fake service on a local port, accepting requests signed with `auth_key`.
    pub async fn start(auth_key: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake service");
        let addr = listener.local_addr().expect("fake service address");
        let base_url = Url::parse(&format!("http://{addr}/")).expect("fake service url");
        let read_region_url = Url::parse(&format!("http://localhost:{}/", addr.port()))
            .expect("read region url");

        let state = FakeState {
            write_url: base_url.to_string(),
            read_url: read_region_url.to_string(),
            ..Default::default()
        };
        let key = MasterKey::from_base64(auth_key).expect("fake service key");
        let shared: Shared = Arc::new((key, Mutex::new(state)));

        let app = Router::new().fallback(handle).with_state(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake service");
        });

        Self {
            base_url,
            read_region_url,
            shared,
        }
    }

    /// A configuration pointing at this service from the write region, with fast retries.
    pub fn config(&self) -> RepositoryConfig {
        self.config_in("West US")
    }

    /// A configuration pointing at this service from `app_region`.
    pub fn config_in(&self, app_region: &str) -> RepositoryConfig {
        RepositoryConfig {
            endpoint: Some(self.base_url.to_string()),
            app_region: Some(app_region.to_string()),
            max_retry_wait_ms: 1_000,
            ..RepositoryConfig::for_testing()
        }
    }

    /// A REST client for this service.
    pub fn client(&self, auth_key: &str) -> RestDocumentClient {
        let policy = ConnectionPolicy::new(ConnectionMode::Gateway, Protocol::Https)
            .with_request_timeout(Duration::from_secs(5))
            .with_retry_options(9, Duration::from_secs(1));
        RestDocumentClient::new(self.base_url.clone(), auth_key, policy).expect("rest client")
    }

    /// Answers the next `count` requests with 429.
    pub fn throttle_next(&self, count: u32) {
        self.shared.1.lock().throttle_remaining = count;
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.1.lock().requests.clone()
    }

    /// Requests matching `method` and `path`.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Throughput header sent when `collection` in `database` was created.
    pub fn offer_throughput(&self, database: &str, collection: &str) -> Option<String> {
        self.shared
            .1
            .lock()
            .collections
            .get(&format!("dbs/{database}/colls/{collection}"))
            .cloned()
            .flatten()
    }

    pub fn collection_count(&self) -> usize {
        self.shared.1.lock().collections.len()
    }
}

async fn handle(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (key, state) = &*shared;
    let mut state = state.lock();

    let raw_path = uri.path().trim_matches('/').to_string();
    let decoded: Vec<String> = raw_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .collect();
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path: segments.join("/"),
        raw_path,
        headers: headers
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if let Err(message) = verify_signature(key, &method, &segments, &headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized", &message);
    }

    if state.throttle_remaining > 0 {
        state.throttle_remaining -= 1;
        let mut response = error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "429",
            "Request rate is large",
        );
        response
            .headers_mut()
            .insert("x-ms-retry-after-ms", HeaderValue::from_static("10"));
        return response;
    }

    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    match (method.as_str(), segments.as_slice()) {
        ("GET", []) => {
            let west = json!({"name": "West US", "databaseAccountEndpoint": state.write_url});
            let east = json!({"name": "Japan East", "databaseAccountEndpoint": state.read_url});
            json_response(
                StatusCode::OK,
                json!({
                    "id": "fake",
                    "readableLocations": [west.clone(), east],
                    "writableLocations": [west],
                    "enableMultipleWriteLocations": false
                }),
            )
        }
        ("POST", ["dbs"]) => {
            let id = body["id"].as_str().unwrap_or_default().to_string();
            if state.databases.contains(&id) {
                return error_response(StatusCode::CONFLICT, "Conflict", "database exists");
            }
            state.databases.push(id.clone());
            json_response(StatusCode::CREATED, json!({"id": id, "_rid": "db-rid"}))
        }
        ("GET", ["dbs", db]) => {
            if state.databases.iter().any(|d| d == db) {
                json_response(StatusCode::OK, json!({"id": db, "_rid": "db-rid"}))
            } else {
                error_response(StatusCode::NOT_FOUND, "NotFound", "database not found")
            }
        }
        ("POST", ["dbs", db, "colls"]) => {
            if !state.databases.iter().any(|d| d == db) {
                return error_response(StatusCode::NOT_FOUND, "NotFound", "database not found");
            }
            let id = body["id"].as_str().unwrap_or_default();
            let link = format!("dbs/{db}/colls/{id}");
            if state.collections.contains_key(&link) {
                return error_response(StatusCode::CONFLICT, "Conflict", "collection exists");
            }
            let throughput = headers
                .get("x-ms-offer-throughput")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            state.collections.insert(link.clone(), throughput);
            state.documents.insert(link, Vec::new());
            let mut created = body.clone();
            created["_rid"] = json!("coll-rid");
            json_response(StatusCode::CREATED, created)
        }
        ("GET", ["dbs", db, "colls", coll]) => {
            let link = format!("dbs/{db}/colls/{coll}");
            if state.collections.contains_key(&link) {
                json_response(
                    StatusCode::OK,
                    json!({"id": coll, "partitionKey": {"paths": ["/id"], "kind": "Hash"}}),
                )
            } else {
                error_response(StatusCode::NOT_FOUND, "NotFound", "collection not found")
            }
        }
        ("POST", ["dbs", db, "colls", coll, "docs"]) => {
            let link = format!("dbs/{db}/colls/{coll}");
            if headers.contains_key("x-ms-documentdb-isquery") {
                query(&state, &link, &headers)
            } else {
                create(&mut state, &link, body)
            }
        }
        (verb @ ("GET" | "PUT" | "DELETE"), ["dbs", db, "colls", coll, "docs", id]) => {
            let link = format!("dbs/{db}/colls/{coll}");
            document(&mut state, verb, &link, id, body)
        }
        _ => error_response(StatusCode::BAD_REQUEST, "BadRequest", "unsupported request"),
    }
}

/// Recomputes the master-key signature of a request over its decoded path
/// `segments` and compares it.
fn verify_signature(
    key: &MasterKey,
    method: &Method,
    segments: &[&str],
    headers: &HeaderMap,
) -> Result<(), String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| format!("missing {name}"))
    };
    let date = header("x-ms-date")?;
    let authorization = header("authorization")?;
    if header("x-ms-version")? != "2018-12-31" {
        return Err("unexpected x-ms-version".to_string());
    }

    let (resource_type, link) = match segments.len() {
        0 => ("", String::new()),
        n if n % 2 == 0 => (segments[n - 2], segments.join("/")),
        n => (segments[n - 1], segments[..n - 1].join("/")),
    };

    let expected = key
        .authorization(method.as_str(), resource_type, &link, date)
        .map_err(|e| e.to_string())?;
    if expected == authorization {
        Ok(())
    } else {
        Err("signature mismatch".to_string())
    }
}

fn query(state: &FakeState, link: &str, headers: &HeaderMap) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let documents = state.documents.get(link).cloned().unwrap_or_default();

    let offset: usize = header("x-ms-continuation")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let page_size = header("x-ms-max-item-count")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(documents.len().max(1));

    let page: Vec<Value> = documents.iter().skip(offset).take(page_size).cloned().collect();
    let next = offset + page.len();

    let mut response = json_response(
        StatusCode::OK,
        json!({"_rid": "coll-rid", "Documents": page, "_count": page.len()}),
    );
    if next < documents.len() {
        response.headers_mut().insert(
            "x-ms-continuation",
            HeaderValue::from_str(&next.to_string()).expect("numeric header"),
        );
    }
    response
}

fn stamp(state: &mut FakeState, mut body: Value) -> Value {
    state.next_rid += 1;
    body["_rid"] = json!(format!("rid-{}", state.next_rid));
    body["_etag"] = json!(format!("\"{}\"", state.next_rid));
    body["_ts"] = json!(1_700_000_000 + state.next_rid);
    body
}

fn create(state: &mut FakeState, link: &str, body: Value) -> Response {
    let Some(id) = body["id"].as_str().map(str::to_string) else {
        return error_response(StatusCode::BAD_REQUEST, "BadRequest", "missing id");
    };
    let exists = match state.documents.get(link) {
        Some(docs) => docs.iter().any(|d| d["id"] == json!(id)),
        None => return error_response(StatusCode::NOT_FOUND, "NotFound", "collection not found"),
    };
    if exists {
        return error_response(
            StatusCode::CONFLICT,
            "Conflict",
            "Entity with the specified id already exists in the system.",
        );
    }
    let stored = stamp(state, body);
    if let Some(docs) = state.documents.get_mut(link) {
        docs.push(stored.clone());
    }
    json_response(StatusCode::CREATED, stored)
}

fn document(state: &mut FakeState, verb: &str, link: &str, id: &str, body: Value) -> Response {
    let position = state
        .documents
        .get(link)
        .and_then(|docs| docs.iter().position(|d| d["id"] == json!(id)));
    let Some(position) = position else {
        return error_response(StatusCode::NOT_FOUND, "NotFound", "document not found");
    };

    match verb {
        "GET" => json_response(StatusCode::OK, state.documents[link][position].clone()),
        "PUT" => {
            let stored = stamp(state, body);
            if let Some(docs) = state.documents.get_mut(link) {
                docs[position] = stored.clone();
            }
            json_response(StatusCode::OK, stored)
        }
        _ => {
            if let Some(docs) = state.documents.get_mut(link) {
                docs.remove(position);
            }
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let mut response = json_response(status, json!({"code": code, "message": message}));
    response
        .headers_mut()
        .insert("x-ms-activity-id", HeaderValue::from_static("fake-activity-id"));
    response
}
