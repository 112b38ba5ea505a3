//! cgraph Render - Render capability, validity analyzer and fetcher
//!
//! The render function that actually draws contributor graphs lives
//! elsewhere; this crate only calls it, judges the markup it returns and
//! retries within a fixed budget.

pub mod analyzer;
pub mod client;
pub mod fetcher;
pub mod retry;

pub use analyzer::{Completeness, ValidityAnalyzer};
pub use client::HttpRenderClient;
pub use fetcher::RenderFetcher;
pub use retry::{AttemptError, RetryError, RetryPolicy};

use async_trait::async_trait;
use cgraph_core::{RenderError, RenderRequest};
use std::sync::Arc;

// ============================================================================
// RENDER CAPABILITY
// ============================================================================

/// Raw answer of the render capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RenderResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can draw a graph for a request.
///
/// Implementations return `Ok` for every answered request, whatever the
/// status; only failures to get an answer at all are errors.
#[async_trait]
pub trait RenderCapability: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError>;
}

#[async_trait]
impl<T: RenderCapability + ?Sized> RenderCapability for Arc<T> {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        (**self).render(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_response_success_range() {
        assert!(RenderResponse::new(200, "").is_success());
        assert!(RenderResponse::new(204, "").is_success());
        assert!(!RenderResponse::new(301, "").is_success());
        assert!(!RenderResponse::new(500, "").is_success());
    }
}
