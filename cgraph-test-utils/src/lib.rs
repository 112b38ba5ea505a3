//! cgraph Test Utilities
//!
//! Shared test infrastructure for the contributor graph cache: SVG
//! fixtures, proptest generators, a scripted render capability and
//! assertion helpers.

use async_trait::async_trait;
use cgraph_core::{RenderError, RenderRequest};
use cgraph_render::{RenderCapability, RenderResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

// Re-export for convenience
pub use proptest;

// ============================================================================
// SCRIPTED RENDERER
// ============================================================================

/// One scripted answer of the [`ScriptedRenderer`].
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Answer with a status and body.
    Answer { status: u16, body: String },
    /// Fail to answer at all.
    TransportError(String),
}

impl ScriptedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Answer {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Answer {
            status,
            body: String::new(),
        }
    }
}

/// Render capability replaying queued answers.
///
/// Answers are consumed in order; once one is left it is repeated for all
/// further calls. Every call is counted and its request recorded.
#[derive(Debug)]
pub struct ScriptedRenderer {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RenderRequest>>,
    calls: AtomicU32,
}

impl ScriptedRenderer {
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Renderer that always returns `body` with status 200.
    pub fn always(body: impl Into<String>) -> Self {
        Self::new([ScriptedResponse::ok(body)])
    }

    /// Number of render calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn next(&self) -> Option<ScriptedResponse> {
        let mut script = self.script.lock().ok()?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl RenderCapability for ScriptedRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.next() {
            Some(ScriptedResponse::Answer { status, body }) => Ok(RenderResponse::new(status, body)),
            Some(ScriptedResponse::TransportError(reason)) => Err(RenderError::Transport { reason }),
            None => Err(RenderError::Transport {
                reason: "script exhausted".to_string(),
            }),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Canned contributor chart markup.
pub mod fixtures {
    /// Width of the bounding rectangle in every fixture chart.
    pub const CHART_WIDTH: u32 = 1000;

    /// Chart whose series line ends at `end_x`. Sized well above the
    /// default minimum viable size.
    pub fn chart(end_x: u32) -> String {
        chart_with_color(end_x, "39a85a")
    }

    /// Chart with its series drawn in `color`.
    pub fn chart_with_color(end_x: u32, color: &str) -> String {
        let mut d = String::from("M0,480");
        let mut x = 0;
        while x + 2 < end_x {
            x += 2;
            d.push_str(&format!(" L{},{}", x, 480 - (x * 46 / 100)));
        }
        d.push_str(&format!(" L{},20", end_x));

        format!(
            concat!(
                r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="500" viewBox="0 0 {w} 500">"##,
                r##"<rect x="0" y="0" width="{w}" height="500" fill="#ffffff"/>"##,
                r##"<g class="axis"><line x1="0" y1="480" x2="{w}" y2="480" stroke="#cccccc"/></g>"##,
                r##"<text x="10" y="20" font-size="14">Contributor Over Time</text>"##,
                r##"<path d="{d}" stroke="#{c}" stroke-width="2" fill="none"/>"##,
                "</svg>"
            ),
            w = CHART_WIDTH,
            d = d,
            c = color
        )
    }

    /// Chart whose series reaches the right edge.
    pub fn complete_chart() -> String {
        chart(CHART_WIDTH - 10)
    }

    /// Chart whose series stops halfway.
    pub fn truncated_chart() -> String {
        chart(CHART_WIDTH / 2)
    }

    /// Complete but tiny rendering, below the minimum viable size.
    pub fn tiny_chart() -> String {
        r##"<svg xmlns="http://www.w3.org/2000/svg"><rect width="100" height="50"/><path d="M0,40 L99,5" stroke="#39a85a"/></svg>"##
            .to_string()
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Proptest strategies for graph cache types.
pub mod generators {
    use cgraph_core::{RenderRequest, RepositoryId};
    use proptest::prelude::*;

    /// Owner or repository name segment.
    pub fn arb_name_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9._-]{0,20}".prop_filter("no parent segments", |s| !s.contains(".."))
    }

    /// Owner segment; owners never contain `_`.
    pub fn arb_owner_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9-]{0,20}"
    }

    /// `owner/name` repository identifier.
    pub fn arb_repository_id() -> impl Strategy<Value = RepositoryId> {
        (arb_owner_segment(), arb_name_segment()).prop_filter_map("valid repository id", |(o, n)| {
            RepositoryId::new(format!("{}/{}", o, n)).ok()
        })
    }

    /// Comma-separated comparison list of one to three repositories.
    pub fn arb_repository_list() -> impl Strategy<Value = RepositoryId> {
        prop::collection::vec((arb_owner_segment(), arb_name_segment()), 1..=3).prop_filter_map(
            "valid repository list",
            |repos| {
                let joined = repos
                    .iter()
                    .map(|(o, n)| format!("{}/{}", o, n))
                    .collect::<Vec<_>>()
                    .join(",");
                RepositoryId::new(joined).ok()
            },
        )
    }

    pub fn arb_render_request() -> impl Strategy<Value = RenderRequest> {
        (prop_oneof![arb_repository_id(), arb_repository_list()], any::<bool>())
            .prop_map(|(repository, merge)| RenderRequest::new(repository, merge))
    }

    /// Series endpoint anywhere inside a fixture chart.
    pub fn arb_endpoint_x() -> impl Strategy<Value = u32> {
        1u32..crate::fixtures::CHART_WIDTH
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Assertion helpers for graph cache results.
pub mod assertions {
    use cgraph_core::{GraphError, GraphResult, RefreshReason};

    /// Assert the result is a `NotFound` signal.
    pub fn assert_not_found<T: std::fmt::Debug>(result: &GraphResult<T>) {
        match result {
            Err(GraphError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    /// Assert the result is a `NeedsUpdate` signal and return its reason.
    pub fn assert_needs_update<T: std::fmt::Debug>(result: &GraphResult<T>) -> RefreshReason {
        match result {
            Err(GraphError::NeedsUpdate { reason, .. }) => reason.clone(),
            other => panic!("Expected NeedsUpdate, got {:?}", other),
        }
    }

    /// Assert two markups are byte-identical, reporting sizes on mismatch.
    pub fn assert_same_bytes(actual: &[u8], expected: &[u8]) {
        assert!(
            actual == expected,
            "Content mismatch: {} bytes vs expected {} bytes",
            actual.len(),
            expected.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgraph_core::FreshnessPolicy;
    use cgraph_render::ValidityAnalyzer;

    #[test]
    fn test_fixture_charts_classify_as_expected() {
        let analyzer = ValidityAnalyzer::default();
        let min_size = FreshnessPolicy::default().min_size_bytes as usize;

        assert!(analyzer.is_complete(&fixtures::complete_chart()));
        assert!(fixtures::complete_chart().len() > min_size);

        assert!(!analyzer.is_complete(&fixtures::truncated_chart()));
        assert!(fixtures::truncated_chart().len() > min_size);

        assert!(analyzer.is_complete(&fixtures::tiny_chart()));
        assert!(fixtures::tiny_chart().len() < min_size);

        assert!(!analyzer.is_complete(&fixtures::chart_with_color(990, "ff0000")));
    }

    #[tokio::test]
    async fn test_scripted_renderer_replays_and_counts() {
        let renderer = ScriptedRenderer::new([
            ScriptedResponse::status(503),
            ScriptedResponse::TransportError("reset".to_string()),
            ScriptedResponse::ok("<svg/>"),
        ]);
        let request = RenderRequest::plain("apache/apisix").unwrap();

        assert_eq!(renderer.render(&request).await.unwrap().status, 503);
        assert!(renderer.render(&request).await.is_err());
        assert_eq!(renderer.render(&request).await.unwrap().body, b"<svg/>".to_vec());
        assert_eq!(renderer.render(&request).await.unwrap().body, b"<svg/>".to_vec());
        assert_eq!(renderer.calls(), 4);
        assert_eq!(renderer.requests().len(), 4);
    }
}
