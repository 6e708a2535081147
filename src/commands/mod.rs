pub mod admin;
pub mod serve;
pub mod worker;

// Re-export command functions for convenience
pub use admin::{inject, stats};
pub use serve::coordinator_server;
pub use worker::{dispatch, report};
