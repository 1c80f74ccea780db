//! Document service clients.
//!
//! [`DocumentDbApi`] is the seam between the repository and the service. It
//! has one method per service interaction the repository needs and reports
//! a missing database, collection or document as [`ClientError::NotFound`],
//! whatever the implementation.
//!
//! Two implementations are provided:
//!
//! | Client | Description |
//! |--------|-------------|
//! | [`RestDocumentClient`] | Talks to the service over its REST API |
//! | [`InMemoryDocumentClient`] | Keeps everything in process; for tests and local development |
//!
//! [`ClientError::NotFound`]: crate::error::ClientError::NotFound

pub mod auth;
pub mod memory;
pub mod rest;

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::ClientResult;
use crate::query::Predicate;
use crate::types::{
    CollectionProperties, DatabaseAccount, DatabaseProperties, Document, FeedOptions, QueryPage,
};

pub use memory::InMemoryDocumentClient;
pub use rest::RestDocumentClient;

/// Operations a document service client provides.
#[async_trait]
pub trait DocumentDbApi: Send + Sync + Debug {
    /// Reads the database account description.
    async fn database_account(&self) -> ClientResult<DatabaseAccount>;

    /// Opens the client ahead of the first request, selecting the regional
    /// read and write endpoints.
    async fn open(&self) -> ClientResult<()>;

    /// Reads a database.
    async fn read_database(&self, database: &str) -> ClientResult<DatabaseProperties>;

    /// Creates a database.
    async fn create_database(&self, database: &str) -> ClientResult<DatabaseProperties>;

    /// Reads a collection.
    async fn read_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> ClientResult<CollectionProperties>;

    /// Creates a collection, provisioning `offer_throughput` when given.
    async fn create_collection(
        &self,
        database: &str,
        collection: &CollectionProperties,
        offer_throughput: Option<u32>,
    ) -> ClientResult<CollectionProperties>;

    /// Reads a document by id.
    async fn read_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> ClientResult<Document>;

    /// Runs one page of a filtered query.
    async fn query_documents(
        &self,
        database: &str,
        collection: &str,
        filter: &Predicate,
        options: &FeedOptions,
    ) -> ClientResult<QueryPage>;

    /// Creates a document. `body` must be an object with a string `id`.
    async fn create_document(
        &self,
        database: &str,
        collection: &str,
        body: Value,
    ) -> ClientResult<Document>;

    /// Replaces the document with id `id`.
    async fn replace_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
    ) -> ClientResult<Document>;

    /// Deletes the document with id `id`.
    async fn delete_document(&self, database: &str, collection: &str, id: &str)
    -> ClientResult<()>;

    /// Endpoint currently serving reads.
    fn read_endpoint(&self) -> Url;

    /// Endpoint currently serving writes.
    fn write_endpoint(&self) -> Url;
}

/// Link of a database resource.
pub(crate) fn database_link(database: &str) -> String {
    format!("dbs/{database}")
}

/// Link of a collection resource.
pub(crate) fn collection_link(database: &str, collection: &str) -> String {
    format!("dbs/{database}/colls/{collection}")
}

/// Link of a document resource.
pub(crate) fn document_link(database: &str, collection: &str, id: &str) -> String {
    format!("dbs/{database}/colls/{collection}/docs/{id}")
}
