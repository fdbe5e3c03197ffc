use std::future::Future;
use std::time::Duration;

/// Result of racing a future against a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled<T> {
    Completed(T),
    TimedOut,
}

/// Whichever settles first wins; the loser is dropped.
pub async fn first_settled<F>(limit: Duration, fut: F) -> Settled<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Settled::Completed(value),
        Err(_) => Settled::TimedOut,
    }
}
