//! cgraph Service - Contributor graph cache orchestration
//!
//! Serves cached contributor graphs and regenerates them from the render
//! function when they are missing, too small or stale.

pub mod config;
pub mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use service::{DefaultGraphService, GraphService, Origin, Served};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
