//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the validity analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Color token identifying the plotted series, without the leading `#`.
    pub series_color: String,
    /// Fraction of the bounding width the series endpoint must exceed.
    pub completion_ratio: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            series_color: "39a85a".to_string(),
            completion_ratio: 0.95,
        }
    }
}

/// Settings for the upstream render capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the render function; `repo` and `merge` are appended as query parameters.
    pub endpoint: String,
    /// Upper bound for a single upstream call.
    pub request_timeout: Duration,
    /// Calls per fetch when the upstream answers with a failure status.
    pub transport_attempts: u32,
    /// Whole fetches when the analyzer rejects the markup.
    pub validity_attempts: u32,
    /// Largest upstream body accepted; longer bodies fail the call.
    pub max_body_bytes: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloudfunction.contributor-graph.com/svg".to_string(),
            request_timeout: Duration::from_secs(30),
            transport_attempts: 2,
            validity_attempts: 2,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Metadata written with every cached graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Lifetime advertised to HTTP caches.
    pub ttl: Duration,
    pub content_type: String,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            content_type: "image/svg+xml;charset=utf-8".to_string(),
        }
    }
}

impl CachePolicy {
    /// `Cache-Control` header value for the configured lifetime.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.ttl.as_secs())
    }
}

/// Thresholds deciding whether a cached graph may be served as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    /// Objects below this size are treated as broken renderings.
    pub min_size_bytes: u64,
    /// Objects older than this are regenerated.
    pub max_age: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            min_size_bytes: 2000,
            max_age: Duration::from_secs(48 * 3600),
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    pub analyzer: AnalyzerConfig,
    pub render: RenderConfig,
    pub cache: CachePolicy,
    pub freshness: FreshnessPolicy,
}

impl GraphConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(GraphError::Config) if invalid.
    ///
    /// Validates:
    /// - completion_ratio in (0.0, 1.0]
    /// - series_color and endpoint non-empty
    /// - attempts >= 1
    /// - All duration values are positive
    pub fn validate(&self) -> GraphResult<()> {
        let ratio = self.analyzer.completion_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(invalid(
                "analyzer.completion_ratio",
                ratio.to_string(),
                "completion_ratio must be in (0.0, 1.0]",
            ));
        }

        if self.analyzer.series_color.trim().is_empty() {
            return Err(GraphError::Config(ConfigError::MissingRequired {
                field: "analyzer.series_color".to_string(),
            }));
        }

        if self.render.endpoint.trim().is_empty() {
            return Err(GraphError::Config(ConfigError::MissingRequired {
                field: "render.endpoint".to_string(),
            }));
        }

        if self.render.request_timeout.is_zero() {
            return Err(invalid(
                "render.request_timeout",
                format!("{:?}", self.render.request_timeout),
                "request_timeout must be positive",
            ));
        }

        if self.render.transport_attempts == 0 {
            return Err(invalid(
                "render.transport_attempts",
                "0".to_string(),
                "at least one attempt is required",
            ));
        }

        if self.render.validity_attempts == 0 {
            return Err(invalid(
                "render.validity_attempts",
                "0".to_string(),
                "at least one attempt is required",
            ));
        }

        if self.render.max_body_bytes == 0 {
            return Err(invalid(
                "render.max_body_bytes",
                "0".to_string(),
                "max_body_bytes must be positive",
            ));
        }

        if self.cache.ttl.is_zero() {
            return Err(invalid(
                "cache.ttl",
                format!("{:?}", self.cache.ttl),
                "ttl must be positive",
            ));
        }

        if self.freshness.max_age.is_zero() {
            return Err(invalid(
                "freshness.max_age",
                format!("{:?}", self.freshness.max_age),
                "max_age must be positive",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> GraphError {
    GraphError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any ratio above 1.0, validate() SHALL return ConfigError::InvalidValue
        #[test]
        fn prop_config_rejects_ratio_above_one(ratio in 1.0001f64..100.0f64) {
            let mut config = GraphConfig::default();
            config.analyzer.completion_ratio = ratio;
            let result = config.validate();
            if let Err(GraphError::Config(ConfigError::InvalidValue { field, .. })) = result {
                prop_assert_eq!(field, "analyzer.completion_ratio");
            } else {
                prop_assert!(false, "Expected ConfigError::InvalidValue");
            }
        }

        /// For any ratio <= 0.0, validate() SHALL return ConfigError::InvalidValue
        #[test]
        fn prop_config_rejects_non_positive_ratio(ratio in -100.0f64..=0.0f64) {
            let mut config = GraphConfig::default();
            config.analyzer.completion_ratio = ratio;
            prop_assert!(config.validate().is_err());
        }

        /// Any ratio in (0, 1] with otherwise default settings is accepted
        #[test]
        fn prop_config_accepts_valid_ratio(ratio in 0.0001f64..=1.0f64) {
            let mut config = GraphConfig::default();
            config.analyzer.completion_ratio = ratio;
            prop_assert!(config.validate().is_ok());
        }
    }
}
