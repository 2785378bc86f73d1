use async_trait::async_trait;

use super::provider::EmbeddingProvider;

/// Hosted, OpenAI-compatible embedding provider. Talks to a remote API over HTTPS.
pub struct RemoteProvider {
    api_key: String,
    model: String,
    dimensions: usize,
    endpoint: Option<String>,
}

impl RemoteProvider {
    /// Create a new remote embedding provider.
    pub fn new(api_key: String, model: String, dimensions: usize, endpoint: Option<String>) -> Self {
        Self {
            api_key,
            model,
            dimensions,
            endpoint,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed_batch(&self, _texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        // The HTTPS round trip to the hosted API is out of scope here; callers
        // get a clean provider-unavailable error instead of a stub response.
        Err(crate::Error::ProviderUnavailable(
            "remote embedding backend is not implemented in this build".into(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "remote"
    }
}
