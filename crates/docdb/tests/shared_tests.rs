//! The process-wide context.
//!
//! The context is a process global, so everything runs in a single test.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::*;
use helios_docdb::{InMemoryDocumentClient, RepositoryContext, RepositoryError, shared};

#[tokio::test]
async fn test_process_wide_context_initializes_once() {
    assert!(!shared::is_initialized());
    assert!(matches!(
        shared::context(),
        Err(RepositoryError::NotInitialized)
    ));
    assert!(matches!(
        shared::repository::<TodoItem>(),
        Err(RepositoryError::NotInitialized)
    ));

    // A failed initialization leaves the context unset.
    let failing = InMemoryDocumentClient::new();
    failing.set_unavailable(true);
    let err = shared::initialize_with(|| {
        RepositoryContext::connect(Arc::new(failing), DATABASE, COLLECTION, Default::default())
    })
    .await
    .unwrap_err();
    assert!(matches!(err, RepositoryError::Client(_)));
    assert!(!shared::is_initialized());

    let client = InMemoryDocumentClient::new();
    let runs = AtomicU32::new(0);
    let first = shared::initialize_with(|| {
        runs.fetch_add(1, Ordering::SeqCst);
        RepositoryContext::connect(
            Arc::new(client.clone()),
            DATABASE,
            COLLECTION,
            Default::default(),
        )
    })
    .await
    .unwrap();

    let second = shared::initialize_with(|| {
        runs.fetch_add(1, Ordering::SeqCst);
        RepositoryContext::connect(
            Arc::new(InMemoryDocumentClient::new()),
            "Other",
            "Other",
            Default::default(),
        )
    })
    .await
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.database(), DATABASE);
    assert_eq!(client.stats().collection_creates, 1);

    let items = shared::repository::<TodoItem>().unwrap();
    items.create_item(&TodoItem::new("1", "shared")).await.unwrap();
    let context = shared::context().unwrap();
    let fetched = context
        .repository::<TodoItem>()
        .get_item("1")
        .await
        .unwrap();
    assert_eq!(fetched.map(|i| i.name), Some("shared".to_string()));
}
