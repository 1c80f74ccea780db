//! The repository facade.
//!
//! [`RepositoryContext`] owns the client handle and the target database and
//! collection. It is built once: building it opens the client and makes sure
//! the database and collection exist. [`DocumentRepository<T>`] is a cheap,
//! typed view over a context that converts between `T` and JSON documents.
//!
//! # Example
//!
//! ```rust,no_run
//! use helios_docdb::{RepositoryConfig, RepositoryContext, field};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct TodoItem {
//!     id: String,
//!     name: String,
//!     is_complete: bool,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = RepositoryContext::initialize(&RepositoryConfig::from_env()).await?;
//! let items = context.repository::<TodoItem>();
//!
//! let open = items.query_items(field("isComplete").eq(false)).await?;
//! println!("{} open items", open.len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::client::{DocumentDbApi, RestDocumentClient};
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::query::Predicate;
use crate::types::{CollectionProperties, Document, FeedOptions, strip_system_properties};

/// Longest id the service accepts.
const MAX_ID_LENGTH: usize = 255;

/// Characters the service does not allow in a document id.
const FORBIDDEN_ID_CHARS: [char; 4] = ['/', '\\', '?', '#'];

/// Tunables applied by the repository to every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Query page size hint; `-1` lets the service decide.
    pub max_item_count: i32,
    /// Throughput provisioned when the collection has to be created.
    pub offer_throughput: Option<u32>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            max_item_count: -1,
            offer_throughput: Some(1000),
        }
    }
}

impl From<&RepositoryConfig> for RepositoryOptions {
    fn from(config: &RepositoryConfig) -> Self {
        Self {
            max_item_count: config.max_item_count,
            offer_throughput: Some(config.offer_throughput),
        }
    }
}

/// An opened client bound to one database and collection.
#[derive(Clone)]
pub struct RepositoryContext {
    client: Arc<dyn DocumentDbApi>,
    database: String,
    collection: String,
    options: RepositoryOptions,
}

impl fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryContext")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RepositoryContext {
    /// Connects to the service described by `config`.
    ///
    /// The preferred-region list starts with the configured home region,
    /// followed by every other region the account reports as readable. The
    /// client is opened before returning and the database and collection are
    /// created if missing.
    pub async fn initialize(config: &RepositoryConfig) -> RepositoryResult<Self> {
        let settings = config.settings()?;
        info!(
            endpoint = %settings.endpoint,
            database = %settings.database,
            collection = %settings.collection,
            region = %settings.app_region,
            "Initializing document repository"
        );

        let base_policy = config.connection_policy();
        let bootstrap = RestDocumentClient::new(
            settings.endpoint.clone(),
            &settings.auth_key,
            base_policy.clone(),
        )?;
        let account = bootstrap.database_account().await?;

        let policy = base_policy
            .with_home_region(settings.app_region.clone())
            .with_readable_locations(&account.readable_locations);
        debug!(preferred = ?policy.preferred_locations, "Computed connection policy");

        let client = RestDocumentClient::new(settings.endpoint, &settings.auth_key, policy)?;
        Self::connect(
            Arc::new(client),
            settings.database,
            settings.collection,
            RepositoryOptions::from(config),
        )
        .await
    }

    /// Opens `client` and makes sure the database and collection exist.
    pub async fn connect(
        client: Arc<dyn DocumentDbApi>,
        database: impl Into<String>,
        collection: impl Into<String>,
        options: RepositoryOptions,
    ) -> RepositoryResult<Self> {
        let context = Self {
            client,
            database: database.into(),
            collection: collection.into(),
            options,
        };

        context.client.open().await?;
        context.ensure_database().await?;
        context.ensure_collection().await?;

        info!(
            database = %context.database,
            collection = %context.collection,
            read = %context.client.read_endpoint(),
            write = %context.client.write_endpoint(),
            "Document repository ready"
        );
        Ok(context)
    }

    async fn ensure_database(&self) -> RepositoryResult<()> {
        match self.client.read_database(&self.database).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                info!(database = %self.database, "Creating database");
                self.client.create_database(&self.database).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_collection(&self) -> RepositoryResult<()> {
        match self
            .client
            .read_collection(&self.database, &self.collection)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                info!(
                    database = %self.database,
                    collection = %self.collection,
                    offer_throughput = ?self.options.offer_throughput,
                    "Creating collection"
                );
                self.client
                    .create_collection(
                        &self.database,
                        &CollectionProperties::new(self.collection.clone()),
                        self.options.offer_throughput,
                    )
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns a typed repository over this context.
    pub fn repository<T>(&self) -> DocumentRepository<T> {
        DocumentRepository {
            context: self.clone(),
            _item: PhantomData,
        }
    }

    /// Database id.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Collection id.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Repository options.
    pub fn options(&self) -> RepositoryOptions {
        self.options
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn DocumentDbApi> {
        &self.client
    }
}

/// CRUD and query operations for items of type `T`.
///
/// Items are stored as JSON documents; `T` must serialize to a JSON object.
/// The document `id` is the item's `id` field.
pub struct DocumentRepository<T> {
    context: RepositoryContext,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DocumentRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("item", &std::any::type_name::<T>())
            .field("context", &self.context)
            .finish()
    }
}

impl<T> DocumentRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    fn client(&self) -> &dyn DocumentDbApi {
        self.context.client.as_ref()
    }

    fn database(&self) -> &str {
        &self.context.database
    }

    fn collection(&self) -> &str {
        &self.context.collection
    }

    /// Reads the item with id `id`; `None` if it does not exist.
    ///
    /// An id that no document can have (empty, longer than 255 characters,
    /// `.` or `..`, or containing `/`, `\`, `?` or `#`, e.g. `a/b`) is
    /// [`RepositoryError::InvalidId`] rather than `None`, and nothing is sent.
    #[instrument(skip(self), fields(collection = %self.context.collection))]
    pub async fn get_item(&self, id: &str) -> RepositoryResult<Option<T>> {
        validate_id(id)?;
        match self
            .client()
            .read_document(self.database(), self.collection(), id)
            .await
        {
            Ok(document) => Ok(Some(from_document(document)?)),
            Err(err) if err.is_not_found() => {
                debug!(id, "Item not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns every item matching `predicate`, following continuation
    /// tokens until the last page.
    #[instrument(skip_all, fields(collection = %self.context.collection))]
    pub async fn query_items(&self, predicate: Predicate) -> RepositoryResult<Vec<T>> {
        let mut options = FeedOptions {
            max_item_count: self.context.options.max_item_count,
            continuation: None,
        };
        let mut items = Vec::new();
        let mut pages = 0u32;

        loop {
            let page = self
                .client()
                .query_documents(self.database(), self.collection(), &predicate, &options)
                .await?;
            pages += 1;

            for body in page.documents {
                items.push(serde_json::from_value(strip_system_properties(body))?);
            }

            match page.continuation {
                Some(token) => options.continuation = Some(token),
                None => break,
            }
        }

        debug!(pages, count = items.len(), "Query complete");
        Ok(items)
    }

    /// Stores a new item. A UUID id is assigned when the item has none.
    #[instrument(skip_all, fields(collection = %self.context.collection))]
    pub async fn create_item(&self, item: &T) -> RepositoryResult<Document> {
        let mut body = to_object(item)?;
        let id = match body_id(&body)? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                insert_id(&mut body, &id);
                id
            }
        };
        validate_id(&id)?;

        let document = self
            .client()
            .create_document(self.database(), self.collection(), body)
            .await?;
        info!(id = %document.id(), "Created item");
        Ok(document)
    }

    /// Replaces the item with id `id`.
    ///
    /// The item's own id is set to `id` when absent; a different id is an
    /// [`RepositoryError::IdMismatch`].
    #[instrument(skip(self, item), fields(collection = %self.context.collection))]
    pub async fn update_item(&self, id: &str, item: &T) -> RepositoryResult<Document> {
        validate_id(id)?;
        let mut body = to_object(item)?;
        match body_id(&body)? {
            Some(actual) if actual != id => {
                return Err(RepositoryError::IdMismatch {
                    expected: id.to_string(),
                    actual,
                });
            }
            Some(_) => {}
            None => insert_id(&mut body, id),
        }

        let document = self
            .client()
            .replace_document(self.database(), self.collection(), id, body)
            .await?;
        info!("Updated item");
        Ok(document)
    }

    /// Deletes the item with id `id`.
    #[instrument(skip(self), fields(collection = %self.context.collection))]
    pub async fn delete_item(&self, id: &str) -> RepositoryResult<()> {
        validate_id(id)?;
        self.client()
            .delete_document(self.database(), self.collection(), id)
            .await?;
        info!("Deleted item");
        Ok(())
    }

    /// Host currently serving reads.
    pub fn read_endpoint(&self) -> String {
        host_of(&self.client().read_endpoint())
    }

    /// Host currently serving writes.
    pub fn write_endpoint(&self) -> String {
        host_of(&self.client().write_endpoint())
    }
}

fn host_of(url: &url::Url) -> String {
    url.host_str().map(str::to_string).unwrap_or_else(|| url.to_string())
}

/// Checks that `id` can address a document.
pub fn validate_id(id: &str) -> RepositoryResult<()> {
    let invalid = |reason: &str| RepositoryError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("id is empty"));
    }
    if id.chars().count() > MAX_ID_LENGTH {
        return Err(invalid("id is longer than 255 characters"));
    }
    if id == "." || id == ".." {
        return Err(invalid("id cannot be a relative path segment"));
    }
    if let Some(c) = id.chars().find(|c| FORBIDDEN_ID_CHARS.contains(c)) {
        return Err(invalid(&format!("id contains '{c}'")));
    }
    Ok(())
}

fn to_object<T: Serialize>(item: &T) -> RepositoryResult<Value> {
    let body = serde_json::to_value(item)?;
    if !body.is_object() {
        return Err(RepositoryError::Serialization {
            message: "item must serialize to a JSON object".to_string(),
        });
    }
    Ok(body)
}

/// The body's id; `None` when absent or null.
fn body_id(body: &Value) -> RepositoryResult<Option<String>> {
    match body.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if id.is_empty() => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(other) => Err(RepositoryError::Serialization {
            message: format!("item id must be a string, found {other}"),
        }),
    }
}

fn insert_id(body: &mut Value, id: &str) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.to_string()));
    }
}

fn from_document<T: DeserializeOwned>(document: Document) -> RepositoryResult<T> {
    Ok(serde_json::from_value(strip_system_properties(
        document.into_body(),
    ))?)
}
