//! Wire-level types exchanged with the document service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// System properties the service adds to every stored document.
pub const SYSTEM_PROPERTIES: [&str; 5] = ["_rid", "_self", "_etag", "_ts", "_attachments"];

/// A stored document: the item body plus service metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    body: Value,
}

impl Document {
    /// Wraps a document body returned by the service.
    ///
    /// Returns `None` when the body is not an object with a string `id`.
    pub fn from_value(body: Value) -> Option<Self> {
        let id = body.get("id")?.as_str()?.to_string();
        Some(Self { id, body })
    }

    /// Returns the document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the service resource id (`_rid`).
    pub fn resource_id(&self) -> Option<&str> {
        self.system_str("_rid")
    }

    /// Returns the entity tag (`_etag`).
    pub fn etag(&self) -> Option<&str> {
        self.system_str("_etag")
    }

    /// Returns the self link (`_self`).
    pub fn self_link(&self) -> Option<&str> {
        self.system_str("_self")
    }

    /// Returns the last-modified timestamp in epoch seconds (`_ts`).
    pub fn timestamp(&self) -> Option<i64> {
        self.body.get("_ts").and_then(Value::as_i64)
    }

    /// Returns the last-modified time.
    pub fn last_modified(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.timestamp()
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
    }

    /// Returns the full body, system properties included.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns the body with system properties removed.
    pub fn content(&self) -> Value {
        strip_system_properties(self.body.clone())
    }

    /// Consumes the document, returning its full body.
    pub fn into_body(self) -> Value {
        self.body
    }

    fn system_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

/// Removes service system properties from a document body.
pub fn strip_system_properties(mut body: Value) -> Value {
    if let Some(obj) = body.as_object_mut() {
        for key in SYSTEM_PROPERTIES {
            obj.remove(key);
        }
    }
    body
}

/// A regional endpoint of a database account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLocation {
    /// Region name, e.g. `"Japan East"`.
    pub name: String,
    /// Regional endpoint URL.
    pub database_account_endpoint: String,
}

/// The service's description of a database account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccount {
    /// Account id.
    #[serde(default)]
    pub id: String,
    /// Regions that serve reads.
    #[serde(default)]
    pub readable_locations: Vec<AccountLocation>,
    /// Regions that accept writes.
    #[serde(default)]
    pub writable_locations: Vec<AccountLocation>,
    /// Whether every writable region accepts writes concurrently.
    #[serde(default)]
    pub enable_multiple_write_locations: bool,
}

/// A database resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseProperties {
    /// Database id.
    pub id: String,
    /// Service resource id.
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl DatabaseProperties {
    /// Properties for a new database.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_id: None,
        }
    }
}

/// Partition key definition of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    /// JSON paths of the key, e.g. `["/id"]`.
    pub paths: Vec<String>,
    /// Partitioning scheme.
    pub kind: String,
}

impl Default for PartitionKeyDefinition {
    fn default() -> Self {
        Self {
            paths: vec!["/id".to_string()],
            kind: "Hash".to_string(),
        }
    }
}

/// A collection resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProperties {
    /// Collection id.
    pub id: String,
    /// Partition key definition.
    #[serde(default)]
    pub partition_key: PartitionKeyDefinition,
    /// Service resource id.
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl CollectionProperties {
    /// Properties for a new collection partitioned on `/id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key: PartitionKeyDefinition::default(),
            resource_id: None,
        }
    }
}

/// A parameterised SQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    /// Query text.
    pub query: String,
    /// Named parameters referenced by the query.
    pub parameters: Vec<SqlParameter>,
}

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    /// Parameter name including the leading `@`.
    pub name: String,
    /// Parameter value.
    pub value: Value,
}

/// Paging options for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Page size hint; `-1` lets the service choose.
    pub max_item_count: i32,
    /// Continuation token from the previous page.
    pub continuation: Option<String>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            max_item_count: -1,
            continuation: None,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Documents on this page, system properties included.
    pub documents: Vec<Value>,
    /// Token for the next page, `None` on the last page.
    pub continuation: Option<String>,
}

impl QueryPage {
    /// Returns `true` if more pages remain.
    pub fn has_more_results(&self) -> bool {
        self.continuation.is_some()
    }
}

/// Body of a query response from the service.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QueryResponseBody {
    #[serde(rename = "Documents", default)]
    pub documents: Vec<Value>,
}
