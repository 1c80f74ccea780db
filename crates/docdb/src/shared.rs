//! The process-wide repository context.
//!
//! Initialization runs at most once per process. Concurrent callers wait
//! for the first initialization to finish and then share its result; a
//! failed initialization leaves the context unset so that a later call can
//! try again.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::{DocumentRepository, RepositoryContext};

static CONTEXT: OnceCell<Arc<RepositoryContext>> = OnceCell::const_new();

/// Initializes the process-wide context from `config`.
///
/// Returns the existing context if one is already set.
pub async fn initialize(config: &RepositoryConfig) -> RepositoryResult<Arc<RepositoryContext>> {
    initialize_with(|| RepositoryContext::initialize(config)).await
}

/// Initializes the process-wide context with `init`.
///
/// `init` only runs if no context has been set yet.
pub async fn initialize_with<F, Fut>(init: F) -> RepositoryResult<Arc<RepositoryContext>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RepositoryResult<RepositoryContext>>,
{
    if CONTEXT.initialized() {
        debug!("Repository context already initialized");
    }
    CONTEXT
        .get_or_try_init(|| async { init().await.map(Arc::new) })
        .await
        .cloned()
}

/// Returns the process-wide context.
pub fn context() -> RepositoryResult<Arc<RepositoryContext>> {
    CONTEXT.get().cloned().ok_or(RepositoryError::NotInitialized)
}

/// Returns a typed repository over the process-wide context.
pub fn repository<T>() -> RepositoryResult<DocumentRepository<T>> {
    Ok(context()?.repository())
}

/// Returns `true` once the process-wide context is set.
pub fn is_initialized() -> bool {
    CONTEXT.initialized()
}
