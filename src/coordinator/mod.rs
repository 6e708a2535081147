//! Coordinator service for the crawl frontier
//!
//! The coordinator owns the frontier and exposes it to workers over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │          Coordinator Server          │
//! │                                      │
//! │  ┌────────────────────────────────┐  │
//! │  │          Orchestrator          │  │
//! │  │  - Frontier (select + claim)   │  │
//! │  │  - Admission gate              │  │
//! │  │  - Content / graph pass-through│  │
//! │  └────────────────────────────────┘  │
//! │                                      │
//! │  ┌────────────────────────────────┐  │
//! │  │           REST API             │  │
//! │  │  GET  /api/next                │  │
//! │  │  POST /api/discovered          │  │
//! │  │  POST /api/content             │  │
//! │  │  POST /api/targets             │  │
//! │  │  GET  /api/targets/{id}        │  │
//! │  │  GET  /api/stats               │  │
//! │  └────────────────────────────────┘  │
//! └──────────────────────────────────────┘
//!                    ▲
//!                    │ CoordinatorClient
//!          ┌─────────┴─────────┐
//!     Dispatcher            Reporter
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use voyager::coordinator::{CoordinatorConfig, CoordinatorServer, Orchestrator};
//! use voyager::frontier::FrontierConfig;
//! use voyager::storage::Stores;
//! use voyager::utils::SystemClock;
//!
//! let orchestrator = Arc::new(Orchestrator::new(
//!     Stores::in_memory(),
//!     Arc::new(SystemClock),
//!     FrontierConfig::default(),
//!     &CoordinatorConfig::default(),
//! ));
//! let server = CoordinatorServer::new(CoordinatorConfig::default(), orchestrator)?;
//! server.start().await?;
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod server;
pub mod service;

// Re-export main types
pub use api::{create_router, ApiResponse, InjectRequest, NextResponse};
pub use client::{ClientConfig, ClientError, CoordinatorClient, HealthStatus};
pub use config::CoordinatorConfig;
pub use server::{AppState, CoordinatorServer, ServerError};
pub use service::{
    ContentReport, DiscoveryAck, DiscoveryReport, InjectAck, InjectTarget, NextTarget,
    Orchestrator, ServiceError,
};
