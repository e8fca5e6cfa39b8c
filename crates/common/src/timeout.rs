//! Bounded execution for persistence calls.

use std::{future::Future, time::Duration};

use crate::{AppError, AppResult};

/// Run `fut` under `limit`, mapping an elapsed deadline to [`AppError::Database`].
pub async fn with_timeout<T, F>(limit: Duration, op: &'static str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    if let Ok(result) = tokio::time::timeout(limit, fut).await {
        result
    } else {
        tracing::warn!(op, timeout_ms = limit.as_millis() as u64, "Persistence call timed out");
        Err(AppError::Database(format!(
            "{op} timed out after {}ms",
            limit.as_millis()
        )))
    }
}
