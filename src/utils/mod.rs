//! Common utilities shared by the coordinator and the worker side

pub mod clock;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{with_retry_if, RetryConfig};
