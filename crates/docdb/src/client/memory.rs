//! In-process document client.
//!
//! [`InMemoryDocumentClient`] implements [`DocumentDbApi`] over plain maps.
//! It mirrors the service where the repository can observe the difference:
//! system properties on stored documents, 404 for missing targets, 409 for
//! duplicate creates, and queries served in pages with continuation tokens.
//! Clones share state, so a test can keep a handle for inspection while the
//! repository owns another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::{DocumentDbApi, collection_link, database_link, document_link};
use crate::error::{ClientError, ClientResult};
use crate::policy::{ConnectionPolicy, ResolvedEndpoints, resolve_endpoints};
use crate::query::Predicate;
use crate::types::{
    AccountLocation, CollectionProperties, DatabaseAccount, DatabaseProperties, Document,
    FeedOptions, QueryPage,
};

const DEFAULT_ENDPOINT: &str = "https://localhost:8081/";
const DEFAULT_PAGE_SIZE: usize = 100;

/// Counters of the calls a client has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// `open` calls.
    pub opens: u32,
    /// `read_database` calls.
    pub database_reads: u32,
    /// `create_database` calls.
    pub database_creates: u32,
    /// `read_collection` calls.
    pub collection_reads: u32,
    /// `create_collection` calls.
    pub collection_creates: u32,
    /// Query pages served.
    pub query_pages: u32,
}

#[derive(Debug)]
struct StoredDocument {
    seq: u64,
    body: Value,
}

#[derive(Debug)]
struct CollectionState {
    properties: CollectionProperties,
    offer_throughput: Option<u32>,
    documents: HashMap<String, StoredDocument>,
}

#[derive(Debug)]
struct DatabaseState {
    properties: DatabaseProperties,
    collections: HashMap<String, CollectionState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: HashMap<String, DatabaseState>,
    seq: u64,
    stats: CallStats,
    endpoints: Option<ResolvedEndpoints>,
    unavailable: bool,
}

/// A [`DocumentDbApi`] that keeps all data in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentClient {
    state: Arc<Mutex<MemoryState>>,
    endpoint: Url,
    account: DatabaseAccount,
    policy: ConnectionPolicy,
    page_size: usize,
}

impl Default for InMemoryDocumentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentClient {
    /// Creates an empty client with a single local region.
    pub fn new() -> Self {
        let endpoint = Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL");
        let local = AccountLocation {
            name: "Local".to_string(),
            database_account_endpoint: DEFAULT_ENDPOINT.to_string(),
        };
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            endpoint,
            account: DatabaseAccount {
                id: "localhost".to_string(),
                readable_locations: vec![local.clone()],
                writable_locations: vec![local],
                enable_multiple_write_locations: false,
            },
            policy: ConnectionPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Replaces the account description reported by [`DocumentDbApi::database_account`].
    pub fn with_account(mut self, account: DatabaseAccount) -> Self {
        self.account = account;
        self
    }

    /// Sets the connection policy used to select endpoints on `open`.
    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the page size used when the query does not ask for one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes every subsequent call fail as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Returns the call counters.
    pub fn stats(&self) -> CallStats {
        self.state.lock().stats
    }

    /// Returns the number of collections in `database`, if it exists.
    pub fn collection_count(&self, database: &str) -> Option<usize> {
        self.state
            .lock()
            .databases
            .get(database)
            .map(|db| db.collections.len())
    }

    /// Returns the number of documents in a collection, if it exists.
    pub fn document_count(&self, database: &str, collection: &str) -> Option<usize> {
        self.state
            .lock()
            .databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|coll| coll.documents.len())
    }

    /// Returns the throughput a collection was created with.
    pub fn offer_throughput(&self, database: &str, collection: &str) -> Option<u32> {
        self.state
            .lock()
            .databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .and_then(|coll| coll.offer_throughput)
    }

    fn lock_available(&self) -> ClientResult<parking_lot::MutexGuard<'_, MemoryState>> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(ClientError::Transport {
                endpoint: self.endpoint.to_string(),
                message: "service unavailable".to_string(),
                source: None,
            });
        }
        Ok(state)
    }
}

fn not_found(resource: String) -> ClientError {
    ClientError::NotFound { resource }
}

fn conflict(resource: &str) -> ClientError {
    ClientError::Service {
        status: 409,
        code: Some("Conflict".to_string()),
        message: format!("Entity with the specified id already exists in the system: {resource}"),
        activity_id: None,
    }
}

fn bad_request(message: impl Into<String>) -> ClientError {
    ClientError::Service {
        status: 400,
        code: Some("BadRequest".to_string()),
        message: message.into(),
        activity_id: None,
    }
}

fn collection_mut<'a>(
    state: &'a mut MemoryState,
    database: &str,
    collection: &str,
) -> ClientResult<&'a mut CollectionState> {
    state
        .databases
        .get_mut(database)
        .and_then(|db| db.collections.get_mut(collection))
        .ok_or_else(|| not_found(collection_link(database, collection)))
}

fn body_id(body: &Value) -> ClientResult<String> {
    body.as_object()
        .ok_or_else(|| bad_request("document body must be a JSON object"))?
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_request("document body must carry a string id"))
}

/// Adds service system properties to `body`.
fn stamp(mut body: Value, database: &str, collection: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        let rid = Uuid::new_v4().simple().to_string();
        obj.insert(
            "_self".to_string(),
            Value::String(format!(
                "{}/docs/{}/",
                collection_link(database, collection),
                rid
            )),
        );
        obj.insert("_rid".to_string(), Value::String(rid));
        obj.insert(
            "_etag".to_string(),
            Value::String(format!("\"{}\"", Uuid::new_v4())),
        );
        obj.insert("_ts".to_string(), Value::from(Utc::now().timestamp()));
        obj.insert(
            "_attachments".to_string(),
            Value::String("attachments/".to_string()),
        );
    }
    body
}

fn to_document(body: Value) -> ClientResult<Document> {
    Document::from_value(body).ok_or_else(|| ClientError::InvalidResponse {
        message: "stored document has no id".to_string(),
    })
}

#[async_trait]
impl DocumentDbApi for InMemoryDocumentClient {
    async fn database_account(&self) -> ClientResult<DatabaseAccount> {
        let _state = self.lock_available()?;
        Ok(self.account.clone())
    }

    async fn open(&self) -> ClientResult<()> {
        let mut state = self.lock_available()?;
        state.stats.opens += 1;
        state.endpoints = Some(resolve_endpoints(
            &self.account,
            &self.policy,
            &self.endpoint,
        ));
        Ok(())
    }

    async fn read_database(&self, database: &str) -> ClientResult<DatabaseProperties> {
        let mut state = self.lock_available()?;
        state.stats.database_reads += 1;
        state
            .databases
            .get(database)
            .map(|db| db.properties.clone())
            .ok_or_else(|| not_found(database_link(database)))
    }

    async fn create_database(&self, database: &str) -> ClientResult<DatabaseProperties> {
        let mut state = self.lock_available()?;
        state.stats.database_creates += 1;
        if state.databases.contains_key(database) {
            return Err(conflict(&database_link(database)));
        }
        let properties = DatabaseProperties {
            id: database.to_string(),
            resource_id: Some(Uuid::new_v4().simple().to_string()),
        };
        state.databases.insert(
            database.to_string(),
            DatabaseState {
                properties: properties.clone(),
                collections: HashMap::new(),
            },
        );
        Ok(properties)
    }

    async fn read_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> ClientResult<CollectionProperties> {
        let mut state = self.lock_available()?;
        state.stats.collection_reads += 1;
        Ok(collection_mut(&mut state, database, collection)?
            .properties
            .clone())
    }

    async fn create_collection(
        &self,
        database: &str,
        collection: &CollectionProperties,
        offer_throughput: Option<u32>,
    ) -> ClientResult<CollectionProperties> {
        let mut state = self.lock_available()?;
        state.stats.collection_creates += 1;
        let db = state
            .databases
            .get_mut(database)
            .ok_or_else(|| not_found(database_link(database)))?;
        if db.collections.contains_key(&collection.id) {
            return Err(conflict(&collection_link(database, &collection.id)));
        }
        let properties = CollectionProperties {
            resource_id: Some(Uuid::new_v4().simple().to_string()),
            ..collection.clone()
        };
        db.collections.insert(
            collection.id.clone(),
            CollectionState {
                properties: properties.clone(),
                offer_throughput,
                documents: HashMap::new(),
            },
        );
        Ok(properties)
    }

    async fn read_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> ClientResult<Document> {
        let mut state = self.lock_available()?;
        let coll = collection_mut(&mut state, database, collection)?;
        let stored = coll
            .documents
            .get(id)
            .ok_or_else(|| not_found(document_link(database, collection, id)))?;
        to_document(stored.body.clone())
    }

    async fn query_documents(
        &self,
        database: &str,
        collection: &str,
        filter: &Predicate,
        options: &FeedOptions,
    ) -> ClientResult<QueryPage> {
        let mut state = self.lock_available()?;
        state.stats.query_pages += 1;

        let offset = match options.continuation.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| bad_request(format!("invalid continuation token '{token}'")))?,
            None => 0,
        };
        let page_size = if options.max_item_count > 0 {
            options.max_item_count as usize
        } else {
            self.page_size
        };

        let coll = collection_mut(&mut state, database, collection)?;
        let mut matching: Vec<&StoredDocument> = coll
            .documents
            .values()
            .filter(|stored| filter.matches(&stored.body))
            .collect();
        matching.sort_by_key(|stored| stored.seq);

        let documents: Vec<Value> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|stored| stored.body.clone())
            .collect();
        let next = offset + documents.len();
        let continuation = (next < matching.len()).then(|| next.to_string());

        Ok(QueryPage {
            documents,
            continuation,
        })
    }

    async fn create_document(
        &self,
        database: &str,
        collection: &str,
        body: Value,
    ) -> ClientResult<Document> {
        let id = body_id(&body)?;
        let mut state = self.lock_available()?;
        state.seq += 1;
        let seq = state.seq;

        let coll = collection_mut(&mut state, database, collection)?;
        if coll.documents.contains_key(&id) {
            return Err(conflict(&document_link(database, collection, &id)));
        }
        let body = stamp(body, database, collection);
        coll.documents.insert(
            id,
            StoredDocument {
                seq,
                body: body.clone(),
            },
        );
        to_document(body)
    }

    async fn replace_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
    ) -> ClientResult<Document> {
        if body_id(&body)? != id {
            return Err(bad_request(
                "the id in the document body does not match the addressed document",
            ));
        }
        let mut state = self.lock_available()?;
        let coll = collection_mut(&mut state, database, collection)?;
        let stored = coll
            .documents
            .get_mut(id)
            .ok_or_else(|| not_found(document_link(database, collection, id)))?;
        stored.body = stamp(body, database, collection);
        to_document(stored.body.clone())
    }

    async fn delete_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> ClientResult<()> {
        let mut state = self.lock_available()?;
        let coll = collection_mut(&mut state, database, collection)?;
        coll.documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(document_link(database, collection, id)))
    }

    fn read_endpoint(&self) -> Url {
        self.state
            .lock()
            .endpoints
            .as_ref()
            .map(|e| e.read.clone())
            .unwrap_or_else(|| self.endpoint.clone())
    }

    fn write_endpoint(&self) -> Url {
        self.state
            .lock()
            .endpoints
            .as_ref()
            .map(|e| e.write.clone())
            .unwrap_or_else(|| self.endpoint.clone())
    }
}
