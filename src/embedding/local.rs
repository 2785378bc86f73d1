use async_trait::async_trait;

use super::provider::EmbeddingProvider;

/// Locally-hosted, Ollama-compatible embedding provider.
pub struct LocalProvider {
    host: String,
    model: String,
    dimensions: usize,
}

impl LocalProvider {
    /// Create a new local embedding provider.
    pub fn new(host: String, model: String, dimensions: usize) -> Self {
        Self {
            host,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_batch(&self, _texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        // The HTTP round trip to the local Ollama-compatible host is out of
        // scope here; callers get a clean provider-unavailable error instead
        // of a stub response.
        Err(crate::Error::ProviderUnavailable(
            "local embedding backend is not implemented in this build".into(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "local"
    }
}
