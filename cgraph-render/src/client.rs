//! HTTP client for the render function

use crate::{RenderCapability, RenderResponse};
use async_trait::async_trait;
use cgraph_core::{RenderConfig, RenderError, RenderRequest};
use reqwest::{Client, Url};
use std::time::Duration;

/// Calls `GET <endpoint>?repo=<id>[&merge=true]`.
pub struct HttpRenderClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    max_body_bytes: u64,
}

impl HttpRenderClient {
    /// Create a new client.
    ///
    /// Every request is bounded by `config.request_timeout`, every body by
    /// `config.max_body_bytes`.
    pub fn new(config: &RenderConfig) -> Result<Self, RenderError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| RenderError::Transport {
            reason: format!("invalid render endpoint {}: {}", config.endpoint, e),
        })?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RenderError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout: config.request_timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// URL the request is sent to.
    pub fn request_url(&self, request: &RenderRequest) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("repo", request.repository.as_str());
            if request.merge {
                query.append_pair("merge", "true");
            }
        }
        url
    }

    fn too_large(&self) -> RenderError {
        RenderError::Transport {
            reason: format!("response body exceeds {} bytes", self.max_body_bytes),
        }
    }

    fn map_error(&self, e: reqwest::Error) -> RenderError {
        if e.is_timeout() {
            RenderError::Timeout {
                after: self.timeout,
            }
        } else {
            RenderError::Transport {
                reason: format!("HTTP request failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl RenderCapability for HttpRenderClient {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        let url = self.request_url(request);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes)
        {
            return Err(self.too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RenderResponse::new(status, body))
    }
}

impl std::fmt::Debug for HttpRenderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRenderClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(endpoint: &str, timeout: Duration) -> RenderConfig {
        RenderConfig {
            endpoint: endpoint.to_string(),
            request_timeout: timeout,
            ..RenderConfig::default()
        }
    }

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut head = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                head.extend_from_slice(&buf[..n]);
                if n == 0 || head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "{}\r\nContent-Type: image/svg+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).to_string()
        });
        (format!("http://{}/svg", addr), handle)
    }

    #[test]
    fn test_request_url_plain_and_merge() {
        let client =
            HttpRenderClient::new(&config("https://render.example/svg", Duration::from_secs(5)))
                .unwrap();

        let plain = client.request_url(&RenderRequest::plain("apache/apisix").unwrap());
        let pairs: Vec<(String, String)> = plain
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs, vec![("repo".to_string(), "apache/apisix".to_string())]);

        let merged = client.request_url(&RenderRequest::merged("apache/apisix").unwrap());
        let pairs: Vec<(String, String)> = merged
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("repo".to_string(), "apache/apisix".to_string()),
                ("merge".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let result = HttpRenderClient::new(&config("not a url", Duration::from_secs(5)));
        assert!(matches!(result, Err(RenderError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_render_returns_status_and_body() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", "<svg></svg>").await;
        let client = HttpRenderClient::new(&config(&endpoint, Duration::from_secs(5))).unwrap();

        let response = client
            .render(&RenderRequest::merged("apache/apisix").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<svg></svg>".to_vec());

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /svg?repo=apache%2Fapisix&merge=true"));
    }

    #[tokio::test]
    async fn test_render_passes_through_error_status() {
        let (endpoint, _server) = serve_once("HTTP/1.1 503 Service Unavailable", "busy").await;
        let client = HttpRenderClient::new(&config(&endpoint, Duration::from_secs(5))).unwrap();

        let response = client
            .render(&RenderRequest::plain("apache/apisix").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (endpoint, _server) = serve_once("HTTP/1.1 200 OK", "<svg>0123456789</svg>").await;
        let client = HttpRenderClient::new(&RenderConfig {
            max_body_bytes: 8,
            ..config(&endpoint, Duration::from_secs(5))
        })
        .unwrap();

        let err = client
            .render(&RenderRequest::plain("apache/apisix").unwrap())
            .await
            .unwrap_err();
        match err {
            RenderError::Transport { reason } => assert!(reason.contains("exceeds 8 bytes")),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_render_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = HttpRenderClient::new(&config(
            &format!("http://{}/svg", addr),
            Duration::from_millis(200),
        ))
        .unwrap();
        let err = client
            .render(&RenderRequest::plain("apache/apisix").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::Timeout {
                after: Duration::from_millis(200)
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpRenderClient::new(&config(
            &format!("http://{}/svg", addr),
            Duration::from_secs(2),
        ))
        .unwrap();
        let err = client
            .render(&RenderRequest::plain("apache/apisix").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Transport { .. }));
    }
}
