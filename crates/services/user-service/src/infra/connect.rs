//! Backend selection and the startup connect step.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use common::{AppError, AppResult, RetryConfig, StoreBackend, StoreError};
use domain::User;

use crate::store::{JsonFileStore, MongoStore, MySqlStore, RecordStore};

/// Instantiate the configured driver, retrying failed connects with backoff.
///
/// Exhausting the attempts returns the last error; callers treat it as fatal.
pub async fn connect_store(
    backend: &StoreBackend,
    retry: &RetryConfig,
) -> AppResult<Arc<dyn RecordStore<User>>> {
    info!(backend = backend.name(), "Connecting storage backend");

    with_retry(retry, || open(backend)).await
}

async fn open(backend: &StoreBackend) -> AppResult<Arc<dyn RecordStore<User>>> {
    let store: Arc<dyn RecordStore<User>> = match backend {
        StoreBackend::Json { path } => Arc::new(JsonFileStore::<User>::open(path.clone()).await?),
        StoreBackend::Mongodb { uri, database } => {
            Arc::new(MongoStore::<User>::connect(uri, database).await?)
        }
        StoreBackend::Mysql { uri } => Arc::new(MySqlStore::<User>::connect(uri).await?),
    };
    Ok(store)
}

/// Failures a later attempt can plausibly get past.
fn is_transient(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Store(StoreError::Connection(_) | StoreError::Io(_))
    )
}

/// Run `attempt` until it succeeds, fails permanently, or the retry budget
/// is spent.
pub(crate) async fn with_retry<T, F, Fut>(retry: &RetryConfig, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = retry.attempts.max(1);
    let mut tried = 0;

    loop {
        tried += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if tried < attempts && is_transient(&e) => {
                let delay = retry.delay_after(tried);
                warn!(
                    attempt = tried,
                    of = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Storage connect failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
