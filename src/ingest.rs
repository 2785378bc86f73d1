use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::chunker::{self};
use crate::embedding::clean::embed_batch_with_cleaning;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::parser::{self, MarkdownFile};

/// Result of ingesting a single file.
#[derive(Debug, Serialize)]
pub struct IngestResult {
    /// Relative path of the ingested file.
    pub path: PathBuf,
    /// Number of chunks produced from the file.
    pub chunks_total: usize,
    /// Number of chunks that were embedded (new or changed).
    pub chunks_embedded: usize,
    /// Number of API calls made to the embedding provider.
    pub api_calls: usize,
    /// Whether the file was skipped entirely (unchanged content hash).
    pub skipped: bool,
}

/// Ingest a single markdown file through the full pipeline:
/// parse -> hash check -> chunk -> embed -> upsert -> save.
///
/// If the file's content hash matches the hash already recorded in the
/// graph, the file is skipped entirely and no embedding calls are made.
pub async fn ingest_file(
    project_root: &Path,
    relative_path: &Path,
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    embeddings_enabled: bool,
    batch_size: usize,
) -> Result<IngestResult> {
    let rel_str = relative_path.to_string_lossy().to_string();
    debug!(path = %rel_str, "ingesting file");

    let file: MarkdownFile = parser::parse_markdown_file(project_root, relative_path, true)?;

    if store.file_hash(&rel_str).as_deref() == Some(file.content_hash.as_str()) {
        debug!(path = %rel_str, "file unchanged, skipping");
        return Ok(IngestResult {
            path: relative_path.to_path_buf(),
            chunks_total: 0,
            chunks_embedded: 0,
            api_calls: 0,
            skipped: true,
        });
    }

    let chunks = chunker::chunk_document(&file);
    let chunks_total = chunks.len();
    let frontmatter_json = file
        .frontmatter
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string());

    let mut embeddings: HashMap<String, Vec<f32>> = HashMap::new();
    let mut api_calls = 0usize;

    if embeddings_enabled && !chunks.is_empty() {
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let (vectors, called) = embed_batch_with_cleaning(provider, &texts).await?;
            if called {
                api_calls += 1;
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                embeddings.insert(chunk.id.clone(), vector);
            }
        }
    }

    let chunks_embedded = embeddings.len();

    store.upsert_page(
        &rel_str,
        &file.folder_path,
        &frontmatter_json,
        &chunks,
        &embeddings,
        &file.content_hash,
    )?;
    store.save()?;

    info!(
        path = %rel_str,
        chunks_total,
        chunks_embedded,
        api_calls,
        "file ingested"
    );

    Ok(IngestResult {
        path: relative_path.to_path_buf(),
        chunks_total,
        chunks_embedded,
        api_calls,
        skipped: false,
    })
}
