use async_trait::async_trait;

use crate::config::{Config, EmbeddingProviderType};
use crate::error::Error;

use super::local::LocalProvider;
use super::mock::MockProvider;
use super::remote::RemoteProvider;

/// Trait for embedding text into vector representations.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input.
    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>>;

    /// The dimensionality of the embedding vectors produced.
    fn dimensions(&self) -> usize;

    /// Human-readable name for this provider.
    fn name(&self) -> &str;
}

/// Create an embedding provider based on the current configuration.
pub fn create_provider(config: &Config) -> crate::Result<Box<dyn EmbeddingProvider>> {
    match config.embedding_provider {
        EmbeddingProviderType::Remote => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                Error::ProviderUnavailable(
                    "remote embedding provider requires OPENAI_API_KEY to be set".into(),
                )
            })?;
            Ok(Box::new(RemoteProvider::new(
                api_key.clone(),
                config.embedding_model.clone(),
                config.embedding_dimensions,
                config.embedding_endpoint.clone(),
            )))
        }
        EmbeddingProviderType::Local => Ok(Box::new(LocalProvider::new(
            config.ollama_host.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions,
        ))),
        EmbeddingProviderType::Mock => Ok(Box::new(MockProvider::new(config.embedding_dimensions))),
    }
}
