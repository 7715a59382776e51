use crate::config::EmbeddingConfig;
use crate::error::EmbedError;
use crate::traits::EmbeddingService;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Talks to an HTTP endpoint taking `{model, prompt}` and answering
/// `{embedding: [..]}`.
pub struct HttpEmbeddingService {
    endpoint: String,
    model: String,
    client: Client,
}

impl HttpEmbeddingService {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        if payload.embedding.is_empty() {
            return Err(EmbedError::EmptyVector);
        }

        Ok(payload.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Bounded retries with a linearly growing pause: after failed attempt `n`
/// the client waits `n * base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

pub struct EmbeddingClient<S> {
    service: S,
    policy: RetryPolicy,
    max_concurrent_requests: Option<usize>,
}

impl<S: EmbeddingService> EmbeddingClient<S> {
    pub fn new(service: S, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            max_concurrent_requests: None,
        }
    }

    pub fn with_max_concurrent_requests(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_requests = limit;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Embeds one text, retrying transient failures. Never substitutes a
    /// placeholder vector: the caller gets either a real embedding or an error.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.service.request_embedding(text).await {
                Ok(vector) => {
                    debug!(attempt, dimensions = vector.len(), "embedding received");
                    return Ok(vector);
                }
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(attempt, max_attempts, delay_secs = delay.as_secs_f64(), %error, "embedding request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) if error.is_transient() => {
                    return Err(EmbedError::Exhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Embeds every chunk of one file concurrently and waits for all of them.
    ///
    /// Output order matches `chunks`. The first failure fails the whole group
    /// and the remaining in-flight requests are dropped.
    pub async fn embed_all(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self
            .max_concurrent_requests
            .unwrap_or(chunks.len())
            .clamp(1, chunks.len());

        stream::iter(chunks.iter())
            .map(|chunk| self.embed(chunk))
            .buffered(limit)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct FlakyService {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl FlakyService {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingService for FlakyService {
        async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(EmbedError::Status {
                    status: 503,
                    body: "busy".to_string(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct EmptyService;

    #[async_trait]
    impl EmbeddingService for EmptyService {
        async fn request_embedding(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::EmptyVector)
        }

        fn model_name(&self) -> &str {
            "empty"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_linear_backoff() {
        let client = EmbeddingClient::new(FlakyService::new(2), RetryPolicy::default());
        let started = tokio::time::Instant::now();

        let vector = client.embed("abcd").await.expect("third attempt succeeds");

        assert_eq!(vector, vec![4.0, 1.0]);
        assert_eq!(client.service().calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_an_error() {
        let client = EmbeddingClient::new(FlakyService::new(u32::MAX), RetryPolicy::default());

        let result = client.embed("abcd").await;

        assert!(matches!(result, Err(EmbedError::Exhausted { attempts: 3, .. })));
        assert_eq!(client.service().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let client = EmbeddingClient::new(EmptyService, RetryPolicy::default());
        assert!(matches!(client.embed("x").await, Err(EmbedError::EmptyVector)));
    }

    #[tokio::test(start_paused = true)]
    async fn embed_all_keeps_chunk_order() {
        let client = EmbeddingClient::new(FlakyService::new(0), RetryPolicy::default())
            .with_max_concurrent_requests(Some(2));
        let chunks = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];

        let vectors = client.embed_all(&chunks).await.unwrap();

        let lengths: Vec<f32> = vectors.iter().map(|vector| vector[0]).collect();
        assert_eq!(lengths, vec![1.0, 3.0, 2.0]);
    }

    /// Answers one request per entry, each on its own connection, and returns
    /// the raw requests received.
    async fn serve_sequence(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status_line, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut received = Vec::new();
                let mut buffer = [0u8; 4096];
                loop {
                    let read = socket.read(&mut buffer).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    received.extend_from_slice(&buffer[..read]);
                    let text = String::from_utf8_lossy(&received).to_string();
                    if let Some(header_end) = text.find("\r\n\r\n") {
                        let content_length = text[..header_end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if received.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }

                let response = format!(
                    "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
                requests.push(String::from_utf8_lossy(&received).to_string());
            }
            requests
        });

        (format!("http://{address}/api/embeddings"), handle)
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let (endpoint, server) = serve_sequence(vec![(status_line, body)]).await;
        let handle = tokio::spawn(async move { server.await.unwrap().remove(0) });
        (endpoint, handle)
    }

    #[tokio::test]
    async fn http_service_posts_model_and_prompt() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", r#"{"embedding":[0.5,0.25]}"#).await;
        let service = HttpEmbeddingService::new(endpoint, "nomic-embed-text", Duration::from_secs(5)).unwrap();

        let vector = service.request_embedding("pump valve").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(vector, vec![0.5, 0.25]);
        assert!(request.starts_with("POST /api/embeddings"));
        assert!(request.contains(r#""model":"nomic-embed-text""#));
        assert!(request.contains(r#""prompt":"pump valve""#));
    }

    #[tokio::test]
    async fn http_service_reports_non_success_status() {
        let (endpoint, server) = serve_once("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let service = HttpEmbeddingService::new(endpoint, "m", Duration::from_secs(5)).unwrap();

        let result = service.request_embedding("text").await;
        server.await.unwrap();

        match result {
            Err(error @ EmbedError::Status { status: 500, .. }) => assert!(error.is_transient()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_transient_http_error() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", r#"{"embedding": "not-a-vector""#).await;
        let service = HttpEmbeddingService::new(endpoint, "m", Duration::from_secs(5)).unwrap();

        let result = service.request_embedding("text").await;
        server.await.unwrap();

        match result {
            Err(EmbedError::Http(error)) => {
                assert!(error.is_decode());
                assert!(EmbedError::Http(error).is_transient());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_retries_after_a_malformed_body() {
        let (endpoint, server) = serve_sequence(vec![
            ("HTTP/1.1 200 OK", "<html>warming up</html>"),
            ("HTTP/1.1 200 OK", r#"{"embedding":[1.0,0.0]}"#),
        ])
        .await;
        let service = HttpEmbeddingService::new(endpoint, "m", Duration::from_secs(5)).unwrap();
        let client = EmbeddingClient::new(
            service,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
        );

        let vector = client.embed("text").await.unwrap();
        let requests = server.await.unwrap();

        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|request| request.contains(r#""prompt":"text""#)));
    }
}
