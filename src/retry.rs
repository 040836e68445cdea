//! Bounded retry for fallible async operations

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Run `op` up to `attempts` times, returning the first success or the last error
///
/// `op` receives the 1-based attempt number. An `attempts` of zero is
/// treated as one.
pub async fn retry_on_error<T, E, F, Fut>(attempts: u32, what: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, attempts, error = %e, "{what} failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
