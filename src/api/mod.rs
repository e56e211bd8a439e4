//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub inbox (for federation)
//! - Well-known discovery (WebFinger, NodeInfo, host-meta)
//! - Metrics (Prometheus)

mod activitypub;
pub mod metrics;
mod wellknown;

pub use activitypub::activitypub_router;
pub use metrics::{metrics_router, track_requests};
pub use wellknown::wellknown_router;
