//! Async utilities
//!
//! Retry policies and deadline wrappers. These back the runtime's two
//! execution boundaries: every external call (LLM, Google Workspace) runs
//! under a bounded [`RetryPolicy`], and every node runs under
//! [`with_timeout`].

pub mod retry;
pub mod timeout;

pub use retry::{run_with_retries, RetryExhausted, RetryPolicy};
pub use timeout::{with_timeout, TimeoutError};
