//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::VaxError;

/// Wrap a future with a timeout. Elapsed calls surface as [`VaxError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, VaxError>>,
) -> Result<T, VaxError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(VaxError::Timeout(duration.as_millis() as u64)),
    }
}
