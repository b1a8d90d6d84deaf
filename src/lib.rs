//! Offline-aware API middleware for the health-tracking assistant backend.
//!
//! Wrap backend calls in an [`ApiMiddleware`] to get response caching,
//! offline queueing with replay, connectivity monitoring and request
//! statistics. [`HealthApiClient`] provides the backend endpoints as
//! [`BackendFn`]s.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod middleware;
pub mod network;
pub mod queue;

pub use backend::{BackendFn, BackendResult, HealthApiClient};
pub use config::Config;
pub use error::{ApiError, BackendError, ErrorKind};
pub use event::{Event, EventHandler};
pub use middleware::{ApiMiddleware, ApiState, RequestOptions};
pub use queue::ReplayOutcome;
