//! REST client for the document service.
//!
//! Requests go through the account gateway over HTTPS and are signed with
//! the master key. Reads and queries are sent to the endpoint selected for
//! reads; creates, replaces and deletes go to the write endpoint. Throttled
//! requests (HTTP 429) are retried after the delay the service asks for,
//! within the policy's retry budget.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::auth::{MasterKey, format_date};
use super::{DocumentDbApi, collection_link, database_link, document_link};
use crate::error::{ClientError, ClientResult};
use crate::policy::{ConnectionMode, ConnectionPolicy, Protocol, ResolvedEndpoints, resolve_endpoints};
use crate::query::Predicate;
use crate::types::{
    CollectionProperties, DatabaseAccount, DatabaseProperties, Document, FeedOptions, QueryPage,
    QueryResponseBody,
};

/// REST API version sent with every request.
pub const API_VERSION: &str = "2018-12-31";

const HEADER_DATE: &str = "x-ms-date";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_IS_QUERY: &str = "x-ms-documentdb-isquery";
const HEADER_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
const HEADER_MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
const HEADER_CONTINUATION: &str = "x-ms-continuation";
const HEADER_OFFER_THROUGHPUT: &str = "x-ms-offer-throughput";
const HEADER_RETRY_AFTER: &str = "x-ms-retry-after-ms";
const HEADER_ACTIVITY_ID: &str = "x-ms-activity-id";

const CONTENT_JSON: &str = "application/json";
const CONTENT_QUERY: &str = "application/query+json";

/// Longest slice of an unparseable error body kept in the error message.
const MAX_ERROR_BODY: usize = 512;

/// Which regional endpoint a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Account,
    Read,
    Write,
}

/// A request before signing.
#[derive(Debug)]
struct Request {
    method: Method,
    route: Route,
    path: Vec<String>,
    resource_type: &'static str,
    resource_link: String,
    headers: Vec<(&'static str, String)>,
    body: Option<(&'static str, Vec<u8>)>,
}

impl Request {
    fn new(
        method: Method,
        route: Route,
        path: &[&str],
        resource_type: &'static str,
        resource_link: String,
    ) -> Self {
        Self {
            method,
            route,
            path: path.iter().map(|segment| segment.to_string()).collect(),
            resource_type,
            resource_link,
            headers: Vec::new(),
            body: None,
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn partition_key(self, id: &str) -> ClientResult<Self> {
        let value = serde_json::to_string(&[id]).map_err(|e| ClientError::InvalidResponse {
            message: format!("failed to encode partition key: {e}"),
        })?;
        Ok(self.header(HEADER_PARTITION_KEY, value))
    }

    fn json(mut self, content_type: &'static str, body: &impl serde::Serialize) -> ClientResult<Self> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::InvalidResponse {
            message: format!("failed to encode request body: {e}"),
        })?;
        self.body = Some((content_type, bytes));
        Ok(self)
    }
}

/// Error body returned by the service.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// A [`DocumentDbApi`] backed by the service's REST API.
#[derive(Debug)]
pub struct RestDocumentClient {
    http: reqwest::Client,
    endpoint: Url,
    key: MasterKey,
    policy: ConnectionPolicy,
    endpoints: RwLock<ResolvedEndpoints>,
}

impl RestDocumentClient {
    /// Creates a client for the account at `endpoint`.
    ///
    /// No request is made until the first operation; call
    /// [`open`](DocumentDbApi::open) to select regional endpoints up front.
    pub fn new(endpoint: Url, auth_key: &str, policy: ConnectionPolicy) -> ClientResult<Self> {
        let key = MasterKey::from_base64(auth_key)?;
        let http = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoints: RwLock::new(ResolvedEndpoints::single(endpoint.clone())),
            endpoint,
            key,
            policy,
        })
    }

    /// Returns the connection policy this client was built with.
    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    fn base_url(&self, route: Route) -> Url {
        match route {
            Route::Account => self.endpoint.clone(),
            Route::Read => self.endpoints.read().read.clone(),
            Route::Write => self.endpoints.read().write.clone(),
        }
    }

    /// Sends `request`, retrying while the service throttles it.
    async fn send(&self, request: Request) -> ClientResult<Response> {
        let url = request_url(&self.base_url(request.route), &request.path)?;

        let mut attempts: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            let date = format_date(Utc::now());
            let authorization = self.key.authorization(
                request.method.as_str(),
                request.resource_type,
                &request.resource_link,
                &date,
            )?;

            let mut builder = self
                .http
                .request(request.method.clone(), url.clone())
                .header("authorization", authorization)
                .header(HEADER_DATE, date)
                .header(HEADER_VERSION, API_VERSION);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }
            if let Some((content_type, body)) = &request.body {
                builder = builder
                    .header(CONTENT_TYPE, *content_type)
                    .body(body.clone());
            }

            debug!(method = %request.method, url = %url, "Sending request");
            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(response.headers());
                attempts += 1;
                if attempts > self.policy.max_retry_attempts
                    || waited + retry_after > self.policy.max_retry_wait
                {
                    return Err(ClientError::Throttled {
                        retry_after_ms: retry_after.as_millis() as u64,
                        attempts,
                    });
                }
                warn!(
                    url = %url,
                    attempt = attempts,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Request throttled, retrying"
                );
                tokio::time::sleep(retry_after).await;
                waited += retry_after;
                continue;
            }

            if status.is_success() {
                return Ok(response);
            }

            let activity_id = header_value(response.headers(), HEADER_ACTIVITY_ID);
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(
                status.as_u16(),
                &request.resource_link,
                activity_id,
                &body,
            ));
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, request: Request) -> ClientResult<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse {
            message: format!("failed to parse response body: {e}"),
        })
    }

    async fn send_document(&self, request: Request) -> ClientResult<Document> {
        let body: Value = self.send_json(request).await?;
        Document::from_value(body).ok_or_else(|| ClientError::InvalidResponse {
            message: "document in response has no id".to_string(),
        })
    }
}

/// Maps a non-success response to a [`ClientError`].
///
/// 404 becomes [`ClientError::NotFound`] naming `resource_link`; anything
/// else keeps the status along with the service's error code and message.
fn error_from_response(
    status: u16,
    resource_link: &str,
    activity_id: Option<String>,
    body: &str,
) -> ClientError {
    if status == 404 {
        return ClientError::NotFound {
            resource: resource_link.to_string(),
        };
    }

    let (code, message) = match serde_json::from_str::<ServiceErrorBody>(body) {
        Ok(parsed) => (
            parsed.code,
            parsed.message.unwrap_or_else(|| truncate(body)),
        ),
        Err(_) => (None, truncate(body)),
    };

    ClientError::Service {
        status,
        code,
        message,
        activity_id,
    }
}

/// Appends `segments` to `base`, percent-encoding each one.
///
/// Ids are sent as single path segments, so `/`, `%`, spaces and non-ASCII
/// characters never change which resource is addressed. `.` and `..` would be
/// resolved away by URL normalization and are refused.
fn request_url(base: &Url, segments: &[String]) -> ClientResult<Url> {
    let invalid = |message: String| ClientError::Transport {
        endpoint: base.to_string(),
        message,
        source: None,
    };

    if let Some(segment) = segments.iter().find(|s| matches!(s.as_str(), "." | "..")) {
        return Err(invalid(format!("path segment '{segment}' cannot be addressed")));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| invalid("endpoint cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Delay requested by a throttled response; one second when absent.
fn retry_after(headers: &HeaderMap) -> Duration {
    header_value(headers, HEADER_RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

#[async_trait]
impl DocumentDbApi for RestDocumentClient {
    async fn database_account(&self) -> ClientResult<DatabaseAccount> {
        let request = Request::new(Method::GET, Route::Account, &[], "", String::new());
        self.send_json(request).await
    }

    async fn open(&self) -> ClientResult<()> {
        if self.policy.connection_mode != ConnectionMode::Gateway
            || self.policy.protocol != Protocol::Https
        {
            warn!(
                mode = %self.policy.connection_mode,
                protocol = %self.policy.protocol,
                "Only gateway mode over HTTPS is supported; using gateway"
            );
        }

        let account = self.database_account().await?;
        let resolved = resolve_endpoints(&account, &self.policy, &self.endpoint);
        info!(
            account = %account.id,
            read = %resolved.read,
            write = %resolved.write,
            preferred = ?self.policy.preferred_locations,
            "Document client opened"
        );
        *self.endpoints.write() = resolved;
        Ok(())
    }

    async fn read_database(&self, database: &str) -> ClientResult<DatabaseProperties> {
        let link = database_link(database);
        let request = Request::new(Method::GET, Route::Read, &["dbs", database], "dbs", link);
        self.send_json(request).await
    }

    async fn create_database(&self, database: &str) -> ClientResult<DatabaseProperties> {
        let request = Request::new(Method::POST, Route::Write, &["dbs"], "dbs", String::new())
            .json(CONTENT_JSON, &DatabaseProperties::new(database))?;
        self.send_json(request).await
    }

    async fn read_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> ClientResult<CollectionProperties> {
        let link = collection_link(database, collection);
        let request = Request::new(
            Method::GET,
            Route::Read,
            &["dbs", database, "colls", collection],
            "colls",
            link,
        );
        self.send_json(request).await
    }

    async fn create_collection(
        &self,
        database: &str,
        collection: &CollectionProperties,
        offer_throughput: Option<u32>,
    ) -> ClientResult<CollectionProperties> {
        let parent = database_link(database);
        let mut request = Request::new(
            Method::POST,
            Route::Write,
            &["dbs", database, "colls"],
            "colls",
            parent,
        )
        .json(CONTENT_JSON, collection)?;
        if let Some(throughput) = offer_throughput {
            request = request.header(HEADER_OFFER_THROUGHPUT, throughput.to_string());
        }
        self.send_json(request).await
    }

    async fn read_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> ClientResult<Document> {
        let link = document_link(database, collection, id);
        let path = ["dbs", database, "colls", collection, "docs", id];
        let request = Request::new(Method::GET, Route::Read, &path, "docs", link).partition_key(id)?;
        self.send_document(request).await
    }

    async fn query_documents(
        &self,
        database: &str,
        collection: &str,
        filter: &Predicate,
        options: &FeedOptions,
    ) -> ClientResult<QueryPage> {
        let parent = collection_link(database, collection);
        let spec = filter.to_sql();
        debug!(query = %spec.query, "Querying documents");

        let mut request = Request::new(
            Method::POST,
            Route::Read,
            &["dbs", database, "colls", collection, "docs"],
            "docs",
            parent,
        )
        .header(HEADER_IS_QUERY, "True")
        .header(HEADER_CROSS_PARTITION, "True")
        .header(HEADER_MAX_ITEM_COUNT, options.max_item_count.to_string())
        .json(CONTENT_QUERY, &spec)?;
        if let Some(token) = &options.continuation {
            request = request.header(HEADER_CONTINUATION, token.clone());
        }

        let response = self.send(request).await?;
        let continuation =
            header_value(response.headers(), HEADER_CONTINUATION).filter(|t| !t.is_empty());
        let bytes = response.bytes().await?;
        let body: QueryResponseBody =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse {
                message: format!("failed to parse query response: {e}"),
            })?;

        Ok(QueryPage {
            documents: body.documents,
            continuation,
        })
    }

    async fn create_document(
        &self,
        database: &str,
        collection: &str,
        body: Value,
    ) -> ClientResult<Document> {
        let id = document_id(&body)?;
        let parent = collection_link(database, collection);
        let request = Request::new(
            Method::POST,
            Route::Write,
            &["dbs", database, "colls", collection, "docs"],
            "docs",
            parent,
        )
        .partition_key(&id)?
        .json(CONTENT_JSON, &body)?;
        self.send_document(request).await
    }

    async fn replace_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
    ) -> ClientResult<Document> {
        let link = document_link(database, collection, id);
        let path = ["dbs", database, "colls", collection, "docs", id];
        let request = Request::new(Method::PUT, Route::Write, &path, "docs", link)
            .partition_key(id)?
            .json(CONTENT_JSON, &body)?;
        self.send_document(request).await
    }

    async fn delete_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> ClientResult<()> {
        let link = document_link(database, collection, id);
        let path = ["dbs", database, "colls", collection, "docs", id];
        let request =
            Request::new(Method::DELETE, Route::Write, &path, "docs", link).partition_key(id)?;
        self.send(request).await?;
        Ok(())
    }

    fn read_endpoint(&self) -> Url {
        self.endpoints.read().read.clone()
    }

    fn write_endpoint(&self) -> Url {
        self.endpoints.read().write.clone()
    }
}

fn document_id(body: &Value) -> ClientResult<String> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidResponse {
            message: "document body must carry a string id".to_string(),
        })
}
