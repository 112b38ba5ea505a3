//! Fetch a rendering and validate it before it can be cached.
//!
//! Two nested bounded loops: the transport loop retries failed upstream
//! calls, the validity loop repeats the whole fetch when the analyzer
//! rejects the markup.

use crate::analyzer::ValidityAnalyzer;
use crate::retry::{AttemptError, RetryError, RetryPolicy};
use crate::{RenderCapability, RenderResponse};
use cgraph_core::{AnalyzeError, RenderConfig, RenderError, RenderRequest, RenderedImage};
use std::fmt;

/// Why one validity attempt failed.
#[derive(Debug)]
enum FetchFailure {
    /// The transport loop gave up; ends the fetch.
    Unavailable(RenderError),
    /// The upstream answered with markup the analyzer rejected.
    Invalid(AnalyzeError),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "{}", e),
            Self::Invalid(e) => write!(f, "{}", e),
        }
    }
}

/// Fetches graphs from a render capability, retrying within a fixed budget.
pub struct RenderFetcher<R> {
    renderer: R,
    analyzer: ValidityAnalyzer,
    transport: RetryPolicy,
    validity: RetryPolicy,
}

impl<R: RenderCapability> RenderFetcher<R> {
    pub fn new(renderer: R, analyzer: ValidityAnalyzer, config: &RenderConfig) -> Self {
        Self {
            renderer,
            analyzer,
            transport: RetryPolicy::new(config.transport_attempts)
                .with_timeout(config.request_timeout),
            validity: RetryPolicy::new(config.validity_attempts),
        }
    }

    pub fn analyzer(&self) -> &ValidityAnalyzer {
        &self.analyzer
    }

    /// Fetch a rendering that passed the analyzer.
    ///
    /// With the default budget this issues at most four upstream calls and
    /// exactly one when the first answer is successful and complete.
    pub async fn fetch_and_validate(
        &self,
        request: &RenderRequest,
    ) -> Result<RenderedImage, RenderError> {
        let outcome = self
            .validity
            .run_if(
                "render_validity",
                |failure: &FetchFailure| matches!(failure, FetchFailure::Invalid(_)),
                |_| self.fetch_once(request),
            )
            .await;

        match outcome {
            Ok(image) => Ok(image),
            Err(RetryError {
                attempts,
                last: AttemptError::Failed(FetchFailure::Invalid(reason)),
            }) => Err(RenderError::Incomplete { attempts, reason }),
            Err(RetryError {
                last: AttemptError::Failed(FetchFailure::Unavailable(err)),
                ..
            }) => Err(err),
            Err(RetryError {
                last: AttemptError::TimedOut(after),
                ..
            }) => Err(RenderError::Timeout { after }),
        }
    }

    /// One validity attempt: a full transport loop, then the analyzer.
    async fn fetch_once(&self, request: &RenderRequest) -> Result<RenderedImage, FetchFailure> {
        let response = self
            .fetch_response(request)
            .await
            .map_err(FetchFailure::Unavailable)?;

        let image = RenderedImage::from_bytes(response.body).map_err(FetchFailure::Invalid)?;
        match self.analyzer.analyze(image.markup()) {
            Ok(completeness) => {
                tracing::debug!(
                    repository = %request.repository,
                    merge = request.merge,
                    endpoint_x = completeness.endpoint_x,
                    bounding_width = completeness.bounding_width,
                    "Rendering accepted"
                );
                Ok(image)
            }
            Err(reason) => Err(FetchFailure::Invalid(reason)),
        }
    }

    async fn fetch_response(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        let outcome = self
            .transport
            .run("render_request", |_| async move {
                let response = self.renderer.render(request).await?;
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(RenderError::BadStatus {
                        status: response.status,
                    })
                }
            })
            .await;

        outcome.map_err(|RetryError { attempts, last }| {
            let (status, reason) = match last {
                AttemptError::Failed(err) => (err.status(), err.to_string()),
                AttemptError::TimedOut(after) => {
                    (None, RenderError::Timeout { after }.to_string())
                }
            };
            RenderError::Unavailable {
                attempts,
                status,
                reason,
            }
        })
    }
}

impl<R> fmt::Debug for RenderFetcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderFetcher")
            .field("analyzer", &self.analyzer)
            .field("transport", &self.transport)
            .field("validity", &self.validity)
            .finish()
    }
}
