//! Deadline enforcement for async operations
//!
//! The interpreter runs every node under a budget; [`with_timeout`] is the
//! shared wrapper that turns an elapsed deadline into a typed error the
//! caller can fold into the turn's error list instead of cancelling
//! silently.

use std::future::Future;
use std::time::Duration;

/// Why a deadline-bounded operation did not produce a value
#[derive(Debug)]
pub enum TimeoutError<E> {
    /// The operation finished in time but returned an error
    Inner(E),
    /// The budget elapsed before the operation finished
    Elapsed(Duration),
}

impl<E> TimeoutError<E> {
    /// Whether the failure was the deadline rather than an inner error
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::Inner(e) => write!(f, "{}", e),
            TimeoutError::Elapsed(budget) => {
                write!(f, "deadline of {}ms elapsed", budget.as_millis())
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Elapsed(_) => None,
        }
    }
}

/// Run a fallible async operation under a budget
///
/// ```rust,ignore
/// let result = with_timeout(limits.node_timeout, node.run(state, ctx)).await;
/// ```
pub async fn with_timeout<F, T, E>(
    budget: Duration,
    operation: F,
) -> std::result::Result<T, TimeoutError<E>>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(budget, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(inner)) => Err(TimeoutError::Inner(inner)),
        Err(_) => Err(TimeoutError::Elapsed(budget)),
    }
}
