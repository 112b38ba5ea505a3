//! Graph service: wires the write path and the read path together.
//!
//! Write path: render fetcher, then cache writer. Read path: the
//! serve-or-refresh decider, falling back to the write path when it signals
//! that the cached graph must be regenerated.

use cgraph_core::{GraphConfig, GraphError, GraphResult, RenderRequest, StorageError};
use cgraph_render::{HttpRenderClient, RenderCapability, RenderFetcher, ValidityAnalyzer};
use cgraph_storage::{
    CacheWriter, CounterStore, FsObjectStore, LmdbCounterStore, ObjectStore, ServeOrRefresh,
};

use crate::config::ServiceConfig;

/// Where a served graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fresh object from the cache.
    Cache,
    /// Rendered and stored during this call.
    Regenerated,
}

/// Graph content handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub content: Vec<u8>,
    pub origin: Origin,
}

/// Contributor graph cache service.
#[derive(Debug)]
pub struct GraphService<R, O, C> {
    fetcher: RenderFetcher<R>,
    writer: CacheWriter<O>,
    decider: ServeOrRefresh<O, C>,
}

/// Service backed by the HTTP render client, a bucket directory and LMDB.
pub type DefaultGraphService = GraphService<HttpRenderClient, FsObjectStore, LmdbCounterStore>;

impl DefaultGraphService {
    /// Build the service from a loaded configuration.
    pub fn from_config(config: &ServiceConfig) -> GraphResult<Self> {
        config.graph.validate()?;
        let renderer = HttpRenderClient::new(&config.graph.render)?;
        let objects = FsObjectStore::new(&config.bucket_dir)?;
        let counters = LmdbCounterStore::new(&config.counter_dir, config.counter_map_size_mb)
            .map_err(StorageError::from)?;

        tracing::info!(
            endpoint = %config.graph.render.endpoint,
            bucket_dir = %config.bucket_dir.display(),
            counter_dir = %config.counter_dir.display(),
            "Graph service configured"
        );
        Ok(GraphService::new(renderer, objects, counters, &config.graph))
    }
}

impl<R, O, C> GraphService<R, O, C>
where
    R: RenderCapability,
    O: ObjectStore + Clone,
    C: CounterStore,
{
    pub fn new(renderer: R, objects: O, counters: C, config: &GraphConfig) -> Self {
        let analyzer = ValidityAnalyzer::new(&config.analyzer);
        Self {
            fetcher: RenderFetcher::new(renderer, analyzer, &config.render),
            writer: CacheWriter::new(objects.clone(), config.cache.clone()),
            decider: ServeOrRefresh::new(objects, counters, config.freshness.clone()),
        }
    }

    /// Render, validate and store the graph for `request`, returning the
    /// stored markup.
    ///
    /// Nothing is stored unless the rendering passed validation.
    pub async fn regenerate(&self, request: &RenderRequest) -> GraphResult<Vec<u8>> {
        let image = self.fetcher.fetch_and_validate(request).await?;
        let key = request.object_key();
        let entry = self.writer.store(&key, image.as_bytes()).await?;

        tracing::info!(
            repository = %request.repository,
            merge = request.merge,
            key = %key,
            size_bytes = entry.content.len(),
            "New graph generated"
        );
        Ok(entry.content)
    }

    /// Serve from the cache only; see [`ServeOrRefresh::get_or_signal_refresh`].
    pub async fn get_cached(&self, request: &RenderRequest) -> GraphResult<Vec<u8>> {
        self.decider.get_or_signal_refresh(request).await
    }

    /// Serve the cached graph, regenerating it first when missing, too small
    /// or stale.
    pub async fn serve(&self, request: &RenderRequest) -> GraphResult<Served> {
        match self.get_cached(request).await {
            Ok(content) => Ok(Served {
                content,
                origin: Origin::Cache,
            }),
            Err(signal) if signal.needs_refresh() => {
                tracing::debug!(
                    repository = %request.repository,
                    merge = request.merge,
                    reason = %signal,
                    "Regenerating graph"
                );
                let content = self.regenerate(request).await.map_err(|err| {
                    log_failure(request, &err);
                    err
                })?;
                Ok(Served {
                    content,
                    origin: Origin::Regenerated,
                })
            }
            Err(err) => {
                log_failure(request, &err);
                Err(err)
            }
        }
    }
}

fn log_failure(request: &RenderRequest, err: &GraphError) {
    tracing::warn!(
        repository = %request.repository,
        merge = request.merge,
        stage = %err.stage(),
        error = %err,
        "Graph request failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cgraph_core::{RenderError, Stage};
    use cgraph_render::RenderResponse;
    use cgraph_storage::{InMemoryCounterStore, InMemoryObjectStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Wide chart whose series reaches `end_x` of 1000, padded well past the
    /// minimum viable size.
    fn chart(end_x: u32) -> String {
        let mut points = String::new();
        for x in (0..end_x).step_by(2) {
            points.push_str(&format!("{},{} ", x, 500 - (x / 2)));
        }
        points.push_str(&format!("{},10", end_x));
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="1000" height="500"><rect width="1000" height="500" fill="#fff"/><polyline points="{}" stroke="#39a85a" fill="none"/></svg>"##,
            points
        )
    }

    struct FixedRenderer {
        status: u16,
        body: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RenderCapability for FixedRenderer {
        async fn render(&self, _request: &RenderRequest) -> Result<RenderResponse, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RenderResponse::new(self.status, self.body.clone()))
        }
    }

    fn service(
        status: u16,
        body: String,
    ) -> (
        GraphService<Arc<FixedRenderer>, InMemoryObjectStore, InMemoryCounterStore>,
        Arc<FixedRenderer>,
        InMemoryObjectStore,
    ) {
        let renderer = Arc::new(FixedRenderer {
            status,
            body,
            calls: AtomicU32::new(0),
        });
        let objects = InMemoryObjectStore::new();
        let service = GraphService::new(
            renderer.clone(),
            objects.clone(),
            InMemoryCounterStore::new(),
            &GraphConfig::default(),
        );
        (service, renderer, objects)
    }

    #[tokio::test]
    async fn test_serve_regenerates_then_serves_from_cache() {
        let (service, renderer, objects) = service(200, chart(990));
        let request = RenderRequest::plain("apache/apisix").unwrap();

        let first = service.serve(&request).await.unwrap();
        assert_eq!(first.origin, Origin::Regenerated);
        assert!(objects.contains(&request.object_key()));

        let second = service.serve(&request).await.unwrap();
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(second.content, first.content);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_rendering_is_not_stored() {
        let (service, renderer, objects) = service(200, chart(500));
        let request = RenderRequest::merged("apache/apisix").unwrap();

        let err = service.serve(&request).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Analyze);
        assert!(matches!(
            err,
            GraphError::Render(RenderError::Incomplete { attempts: 2, .. })
        ));
        assert!(objects.is_empty());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_upstream_reports_fetch_stage() {
        let (service, _, objects) = service(500, String::new());
        let request = RenderRequest::plain("apache/apisix").unwrap();

        let err = service.regenerate(&request).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Fetch);
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_get_cached_does_not_regenerate() {
        let (service, renderer, _) = service(200, chart(990));
        let request = RenderRequest::plain("apache/apisix").unwrap();

        let err = service.get_cached(&request).await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }
}
