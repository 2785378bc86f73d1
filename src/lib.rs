//! Local knowledge-graph indexer and hybrid search engine for a tree of
//! markdown notes: parses files into a page/chunk/tag/folder graph,
//! embeds chunk text, and serves keyword, semantic, and fused search over
//! the result.
//!
//! The gRPC transport, the MCP/HTTP tool server, and the embedding
//! provider's HTTP internals are out of scope for this crate; [`dispatch`]
//! exposes the typed request/response core those transports would bind to,
//! and [`supervisor`] owns the process lifecycle they'd be started from.

pub mod chunker;
pub mod config;
pub mod config_tracker;
pub mod discovery;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod search;
pub mod supervisor;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use graph::{GraphStatus, GraphStore};
pub use supervisor::Supervisor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::embedding::provider::{create_provider, EmbeddingProvider};

/// Top-level handle combining the graph store, the configured embedding
/// provider, and the space root they operate over.
///
/// This is the library-facing entry point for callers that want to drive
/// indexing and search directly (tests, the `init-index` CLI) without
/// going through the process supervisor's signal-driven lifecycle.
pub struct Engine {
    space_path: PathBuf,
    config: Config,
    store: Arc<GraphStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Engine {
    /// Load configuration from `project_root` (shell env > `.env` > defaults)
    /// and open or create the graph store it names.
    pub fn open(project_root: &Path) -> Result<Self> {
        let config = Config::load(project_root)?;
        Self::open_with_config(config)
    }

    /// Open or create the graph store for an already-loaded configuration.
    pub fn open_with_config(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.db_path)?;
        let store_path = config.db_path.join("graph.ldg");
        let store = Arc::new(GraphStore::open_or_create(&store_path, &config)?);
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config)?);
        let space_path = config.space_path.clone();

        Ok(Self {
            space_path,
            config,
            store,
            provider,
        })
    }

    pub fn space_path(&self) -> &Path {
        &self.space_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn store_arc(&self) -> Arc<GraphStore> {
        Arc::clone(&self.store)
    }

    pub fn provider_arc(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.provider)
    }

    /// Current graph size and configuration snapshot.
    pub fn status(&self) -> GraphStatus {
        self.store.status()
    }

    /// Wipe the graph so the next [`Engine::reindex_all`] re-embeds every
    /// file from scratch, regardless of content hash.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()?;
        self.store.save()
    }

    /// Discover every indexable file under the space and ingest each one,
    /// skipping files whose content hash hasn't changed. Returns the count
    /// of files that were actually (re)indexed.
    ///
    /// `CONFIG.md`, if present, is additionally parsed and used to refresh
    /// the sidecar `space_config.json` document.
    pub async fn reindex_all(&self) -> Result<usize> {
        let supervisor = Supervisor::from_parts(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
        );
        supervisor.reindex_all().await
    }

    /// Watch the space for filesystem changes and incrementally re-index,
    /// blocking until `cancel` is triggered.
    pub async fn watch(&self, cancel: tokio_util::sync::CancellationToken) -> Result<()> {
        let watcher = watcher::Watcher::new(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
        );
        watcher.watch(cancel).await
    }
}
