//! Error types for graph generation, caching and serving

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Reasons the validity analyzer rejects a rendering.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyzeError {
    #[error("Could not get bounding width: {reason}")]
    WidthNotFound { reason: String },

    #[error("Could not find series line with color {color}")]
    EndpointNotFound { color: String },

    #[error("Series endpoint is not an integer coordinate: {token}")]
    EndpointUnparseable { token: String },

    #[error(
        "Line does not reach its end: endpoint {endpoint_x} of width {bounding_width} (ratio {ratio:.3})"
    )]
    LineIncomplete {
        endpoint_x: i64,
        bounding_width: i64,
        ratio: f64,
    },

    #[error("Malformed markup: {reason}")]
    MalformedMarkup { reason: String },
}

impl AnalyzeError {
    /// True when the markup parsed but the line stops short of the edge.
    pub fn is_incomplete_line(&self) -> bool {
        matches!(self, Self::LineIncomplete { .. })
    }
}

/// Errors talking to the render capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("Render unavailable after {attempts} attempt(s) (status {status:?}): {reason}")]
    Unavailable {
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },

    #[error("Render request returned status {status}")]
    BadStatus { status: u16 },

    #[error("Render request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Render transport failed: {reason}")]
    Transport { reason: String },

    #[error("Render incomplete after {attempts} attempt(s): {reason}")]
    Incomplete { attempts: u32, reason: AnalyzeError },
}

impl RenderError {
    /// Status code carried by this error, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unavailable { status, .. } => *status,
            Self::BadStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// Object and counter store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Counter update failed for {subject_key}: {reason}")]
    CounterFailed { subject_key: String, reason: String },

    #[error("Storage backend unavailable: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Why a cached graph must be regenerated before it can be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReason {
    /// Object is smaller than the minimum viable size.
    TooSmall { size_bytes: u64, min_size_bytes: u64 },
    /// Object is older than the maximum age.
    Stale { age: Duration, max_age: Duration },
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall {
                size_bytes,
                min_size_bytes,
            } => write!(f, "size {} below minimum {}", size_bytes, min_size_bytes),
            Self::Stale { age, max_age } => {
                write!(f, "age {}s exceeds {}s", age.as_secs(), max_age.as_secs())
            }
        }
    }
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Request,
    Config,
    Fetch,
    Analyze,
    Store,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Config => "config",
            Self::Fetch => "fetch",
            Self::Analyze => "analyze",
            Self::Store => "store",
            Self::Read => "read",
        };
        f.write_str(name)
    }
}

/// Master error type for all graph cache operations.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Analyze error: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Cache hit that must not be served as-is. A signal, not a failure.
    #[error("Graph {key} needs update: {reason}")]
    NeedsUpdate { key: String, reason: RefreshReason },

    /// Nothing cached under the key yet.
    #[error("Graph {key} not found")]
    NotFound { key: String },
}

impl GraphError {
    /// True when the caller should run the write path and retry.
    pub fn needs_refresh(&self) -> bool {
        matches!(self, Self::NeedsUpdate { .. } | Self::NotFound { .. })
    }

    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Render(RenderError::Incomplete { .. }) => Stage::Analyze,
            Self::Render(_) => Stage::Fetch,
            Self::Analyze(_) => Stage::Analyze,
            Self::Storage(StorageError::WriteFailed { .. }) => Stage::Store,
            Self::Storage(_) => Stage::Read,
            Self::Validation(_) => Stage::Request,
            Self::Config(_) => Stage::Config,
            Self::NeedsUpdate { .. } | Self::NotFound { .. } => Stage::Read,
        }
    }
}

/// Result type alias for graph cache operations.
pub type GraphResult<T> = Result<T, GraphError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_error_display_line_incomplete() {
        let err = AnalyzeError::LineIncomplete {
            endpoint_x: 500,
            bounding_width: 800,
            ratio: 0.625,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not reach its end"));
        assert!(msg.contains("500"));
        assert!(msg.contains("800"));
        assert!(msg.contains("0.625"));
        assert!(err.is_incomplete_line());
    }

    #[test]
    fn test_render_error_display_incomplete_carries_reason() {
        let err = RenderError::Incomplete {
            attempts: 2,
            reason: AnalyzeError::EndpointNotFound {
                color: "39a85a".to_string(),
            },
        };
        let msg = format!("{}", err);
        assert!(msg.contains("2 attempt"));
        assert!(msg.contains("39a85a"));
    }

    #[test]
    fn test_render_error_status() {
        assert_eq!(RenderError::BadStatus { status: 502 }.status(), Some(502));
        assert_eq!(
            RenderError::Transport {
                reason: "refused".to_string()
            }
            .status(),
            None
        );
    }

    #[test]
    fn test_refresh_reason_display() {
        let reason = RefreshReason::TooSmall {
            size_bytes: 1999,
            min_size_bytes: 2000,
        };
        assert_eq!(reason.to_string(), "size 1999 below minimum 2000");

        let reason = RefreshReason::Stale {
            age: Duration::from_secs(49 * 3600),
            max_age: Duration::from_secs(48 * 3600),
        };
        assert!(reason.to_string().contains("176400"));
    }

    #[test]
    fn test_graph_error_signals() {
        let missing = GraphError::NotFound {
            key: "a.svg".to_string(),
        };
        let stale = GraphError::NeedsUpdate {
            key: "a.svg".to_string(),
            reason: RefreshReason::TooSmall {
                size_bytes: 1,
                min_size_bytes: 2000,
            },
        };
        let broken = GraphError::from(StorageError::LockPoisoned);

        assert!(missing.needs_refresh());
        assert!(stale.needs_refresh());
        assert!(!broken.needs_refresh());
    }

    #[test]
    fn test_graph_error_stage() {
        assert_eq!(
            GraphError::from(RenderError::Timeout {
                after: Duration::from_secs(1)
            })
            .stage(),
            Stage::Fetch
        );
        assert_eq!(
            GraphError::from(RenderError::Incomplete {
                attempts: 2,
                reason: AnalyzeError::WidthNotFound {
                    reason: "no rect".to_string()
                },
            })
            .stage(),
            Stage::Analyze
        );
        assert_eq!(
            GraphError::from(StorageError::WriteFailed {
                key: "a".to_string(),
                reason: "disk full".to_string(),
            })
            .stage(),
            Stage::Store
        );
        assert_eq!(
            GraphError::from(StorageError::CounterFailed {
                subject_key: "a".to_string(),
                reason: "x".to_string(),
            })
            .stage(),
            Stage::Read
        );
        assert_eq!(Stage::Store.to_string(), "store");
    }

    #[test]
    fn test_graph_error_from_variants() {
        let storage = GraphError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, GraphError::Storage(_)));

        let render = GraphError::from(RenderError::BadStatus { status: 500 });
        assert!(matches!(render, GraphError::Render(_)));

        let analyze = GraphError::from(AnalyzeError::MalformedMarkup {
            reason: "eof".to_string(),
        });
        assert!(matches!(analyze, GraphError::Analyze(_)));

        let validation = GraphError::from(ValidationError::RequiredFieldMissing {
            field: "repository".to_string(),
        });
        assert!(matches!(validation, GraphError::Validation(_)));

        let config = GraphError::from(ConfigError::MissingRequired {
            field: "endpoint".to_string(),
        });
        assert!(matches!(config, GraphError::Config(_)));
    }
}
