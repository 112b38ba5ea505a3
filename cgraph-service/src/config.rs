//! Service Configuration Module
//!
//! Loads the graph cache settings and store locations from environment
//! variables, falling back to the built-in defaults for anything unset.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cgraph_core::{ConfigError, GraphConfig, GraphResult};

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Full configuration of a graph service instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Analyzer, render, cache and freshness settings.
    pub graph: GraphConfig,

    /// Directory used as the object bucket.
    pub bucket_dir: PathBuf,

    /// Directory holding the LMDB counter environment.
    pub counter_dir: PathBuf,

    /// LMDB map size in megabytes.
    pub counter_map_size_mb: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            bucket_dir: PathBuf::from("data/bucket"),
            counter_dir: PathBuf::from("data/counters"),
            counter_map_size_mb: 64,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    ///
    /// Recognized variables:
    /// - `CGRAPH_RENDER_ENDPOINT`
    /// - `CGRAPH_RENDER_TIMEOUT_SECS`
    /// - `CGRAPH_RENDER_MAX_BODY_BYTES`
    /// - `CGRAPH_BUCKET_DIR`
    /// - `CGRAPH_COUNTER_DIR`
    /// - `CGRAPH_MIN_SIZE_BYTES`
    /// - `CGRAPH_MAX_AGE_HOURS`
    /// - `CGRAPH_CACHE_TTL_SECS`
    /// - `CGRAPH_COMPLETION_RATIO`
    /// - `CGRAPH_SERIES_COLOR`
    pub fn from_env() -> GraphResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let graph = &mut config.graph;

        if let Some(endpoint) = lookup("CGRAPH_RENDER_ENDPOINT") {
            graph.render.endpoint = endpoint;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CGRAPH_RENDER_TIMEOUT_SECS")? {
            graph.render.request_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var::<u64, _>(&lookup, "CGRAPH_RENDER_MAX_BODY_BYTES")? {
            graph.render.max_body_bytes = bytes;
        }
        if let Some(bytes) = parse_var::<u64, _>(&lookup, "CGRAPH_MIN_SIZE_BYTES")? {
            graph.freshness.min_size_bytes = bytes;
        }
        if let Some(hours) = parse_var::<u64, _>(&lookup, "CGRAPH_MAX_AGE_HOURS")? {
            graph.freshness.max_age = Duration::from_secs(hours * 3600);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CGRAPH_CACHE_TTL_SECS")? {
            graph.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(ratio) = parse_var::<f64, _>(&lookup, "CGRAPH_COMPLETION_RATIO")? {
            graph.analyzer.completion_ratio = ratio;
        }
        if let Some(color) = lookup("CGRAPH_SERIES_COLOR") {
            graph.analyzer.series_color = color;
        }
        if let Some(dir) = lookup("CGRAPH_BUCKET_DIR") {
            config.bucket_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CGRAPH_COUNTER_DIR") {
            config.counter_dir = PathBuf::from(dir);
        }

        config.graph.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
