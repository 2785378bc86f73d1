use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::config_tracker;
use crate::discovery::FileDiscovery;
use crate::embedding::provider::{create_provider, EmbeddingProvider};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::ingest;
use crate::parser;
use crate::watcher::Watcher;

/// Grace period given to the watcher observer (and, in a full deployment, the
/// gRPC server) to finish in-flight work before being dropped on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the single shared graph handle for the process and the watcher
/// task built on top of it.
///
/// The gRPC service and the MCP/HTTP tool server named in the external
/// interfaces are started and stopped by this same lifecycle in a full
/// deployment; binding them to an actual transport is outside this crate's
/// scope, so this type starts only the watcher and leaves a slot (`extra_tasks`)
/// for a caller to register additional cancellation-aware tasks.
pub struct Supervisor {
    config: Config,
    store: Arc<GraphStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Open the graph store in writable mode and construct the embedding
    /// provider, without starting the watcher yet.
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(GraphStore::open_or_create(&config.db_path.join("graph.ldg"), &config)?);
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config)?);
        Ok(Self {
            config,
            store,
            provider,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a supervisor around an already-open store and provider, for
    /// callers (such as [`crate::Engine`]) that manage those handles
    /// themselves and only want the reindex/watch orchestration.
    pub fn from_parts(config: Config, store: Arc<GraphStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            store,
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// A shared handle to the graph, for read paths constructed outside the
    /// supervisor (RPC handlers, tool-server routes).
    pub fn store(&self) -> Arc<GraphStore> {
        Arc::clone(&self.store)
    }

    /// A token callers can use to join the supervisor's shutdown sequence.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Detach-delete every node in the graph, forcing the next
    /// [`Supervisor::reindex_all`] call to re-embed every file from scratch.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()?;
        self.store.save()
    }

    /// Run a full reindex of every discovered file, synchronously.
    pub async fn reindex_all(&self) -> Result<usize> {
        let discovery = FileDiscovery::new(&self.config);
        let files = discovery.discover()?;
        let mut indexed = 0usize;

        for relative in &files {
            if relative.file_name().and_then(|n| n.to_str()) == Some("CONFIG.md") {
                if let Ok(content) = std::fs::read_to_string(self.config.space_path.join(relative)) {
                    if let Err(e) = config_tracker::update_space_config(&content, &self.config.db_path) {
                        warn!(error = %e, "failed to update space config");
                    }
                }
            }

            match ingest::ingest_file(
                &self.config.space_path,
                relative,
                &self.store,
                self.provider.as_ref(),
                self.config.enable_embeddings,
                self.config.embedding_batch_size,
            )
            .await
            {
                Ok(result) => {
                    if !result.skipped {
                        indexed += 1;
                    }
                }
                Err(e) => error!(path = %relative.display(), error = %e, "failed to index file during reindex"),
            }
        }

        let folder_paths = parser::get_folder_paths(&self.config.space_path);
        let index_pages = parser::get_folder_index_pages(&self.config.space_path);
        self.store.upsert_folders(&folder_paths, &index_pages)?;
        self.store.save()?;

        info!(files = files.len(), indexed, folders = folder_paths.len(), "initial reindex complete");
        Ok(indexed)
    }

    /// Start the watcher as a background task and block until a shutdown
    /// signal (`SIGTERM` or `SIGINT`) arrives, then stop it with a grace
    /// period.
    pub async fn run(self) -> Result<()> {
        self.reindex_all().await?;

        let watcher = Watcher::new(self.config.clone(), Arc::clone(&self.store), Arc::clone(&self.provider));
        let watch_cancel = self.cancel.clone();
        let watch_handle: JoinHandle<Result<()>> =
            tokio::spawn(async move { watcher.watch(watch_cancel).await });

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, stopping watcher");
        self.cancel.cancel();

        match tokio::time::timeout(SHUTDOWN_GRACE, watch_handle).await {
            Ok(Ok(Ok(()))) => info!("watcher stopped cleanly"),
            Ok(Ok(Err(e))) => error!(error = %e, "watcher exited with error"),
            Ok(Err(e)) => error!(error = %e, "watcher task panicked"),
            Err(_) => warn!("watcher did not stop within grace period"),
        }

        self.store.save()?;
        info!("supervisor shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, falling back to ctrl_c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Open or create the sidecar database directory, mirroring how the graph
/// store file itself is laid out under `config.db_path`.
pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    std::fs::create_dir_all(db_path)?;
    Ok(())
}
