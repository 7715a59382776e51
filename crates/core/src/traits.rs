use crate::error::EmbedError;
use async_trait::async_trait;

/// One round trip to an embedding backend. Retrying is layered on top by
/// [`crate::embeddings::EmbeddingClient`].
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn model_name(&self) -> &str;
}
