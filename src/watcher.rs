use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_full::notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::discovery::FileDiscovery;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::ingest;

/// A filesystem event relevant to the graph.
#[derive(Debug, Clone)]
pub enum FileEvent {
    /// A new markdown file was created.
    Created(PathBuf),
    /// An existing markdown file was modified.
    Modified(PathBuf),
    /// A markdown file was deleted.
    Deleted(PathBuf),
    /// A markdown file was renamed from one path to another.
    Renamed { from: PathBuf, to: PathBuf },
}

/// Watches the configured notes space for markdown file changes and
/// triggers incremental re-indexing, one file at a time.
///
/// Events are debounced by `config.watch_debounce_ms` before being
/// classified and queued; each queued path is then hash-gated inside
/// [`ingest::ingest_file`] so a debounced burst of saves on one file only
/// costs a single re-embed once the content actually differs from what's
/// already in the graph.
pub struct Watcher {
    config: Config,
    space_path: PathBuf,
    store: Arc<GraphStore>,
    provider: Arc<dyn EmbeddingProvider>,
    discovery: FileDiscovery,
}

impl Watcher {
    /// Create a new `Watcher`.
    pub fn new(config: Config, store: Arc<GraphStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let discovery = FileDiscovery::new(&config);
        let space_path = config.space_path.clone();
        Self {
            config,
            space_path,
            store,
            provider,
            discovery,
        }
    }

    /// Start watching the notes space for changes.
    ///
    /// Blocks until `cancel` is triggered.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<FileEvent>();

        let debounce_duration = Duration::from_millis(self.config.watch_debounce_ms);
        let space_path = self.space_path.clone();
        let cb_discovery = FileDiscovery::new(&self.config);

        let mut debouncer = new_debouncer(
            debounce_duration,
            None,
            move |result: DebounceEventResult| {
                let events = match result {
                    Ok(events) => events,
                    Err(errs) => {
                        for e in errs {
                            error!("debouncer error: {e}");
                        }
                        return;
                    }
                };

                for event in events {
                    let file_events =
                        classify_event(&event.event.kind, &event.paths, &space_path, &cb_discovery);
                    for fe in file_events {
                        if tx.send(fe).is_err() {
                            debug!("watcher channel closed, stopping event forwarding");
                            return;
                        }
                    }
                }
            },
        )
        .map_err(|e| Error::Watch(format!("failed to create debouncer: {e}")))?;

        if !self.space_path.is_dir() {
            return Err(Error::Watch(format!(
                "space path does not exist: {}",
                self.space_path.display()
            )));
        }
        debouncer
            .watch(&self.space_path, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("failed to watch {}: {e}", self.space_path.display())))?;

        info!(
            path = %self.space_path.display(),
            debounce_ms = self.config.watch_debounce_ms,
            "file watcher started"
        );

        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    if let Err(e) = self.handle_event(&event).await {
                        error!(?event, error = %e, "error handling watch event");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("file watcher shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process a single file event.
    pub async fn handle_event(&self, event: &FileEvent) -> Result<()> {
        match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => self.process_file(path).await,
            FileEvent::Deleted(path) => {
                let relative = path.to_string_lossy().to_string();
                info!(path = %relative, "removing deleted file from graph");
                self.store.delete_page(&relative)?;
                self.store.save()
            }
            FileEvent::Renamed { from, to } => {
                let from_str = from.to_string_lossy().to_string();
                debug!(from = %from_str, to = %to.display(), "processing rename event");
                self.store.delete_page(&from_str)?;
                self.process_file(to).await
            }
        }
    }

    async fn process_file(&self, relative_path: &Path) -> Result<()> {
        let abs_path = self.space_path.join(relative_path);

        // A Modify event can arrive for a file that was removed before we got to it.
        if !abs_path.is_file() {
            let relative = relative_path.to_string_lossy().to_string();
            info!(path = %relative, "file no longer exists, removing from graph");
            self.store.delete_page(&relative)?;
            return self.store.save();
        }

        ingest::ingest_file(
            &self.space_path,
            relative_path,
            &self.store,
            self.provider.as_ref(),
            self.config.enable_embeddings,
            self.config.embedding_batch_size,
        )
        .await?;

        Ok(())
    }
}

/// Classify a notify event into zero or more `FileEvent` values.
fn classify_event(
    kind: &EventKind,
    paths: &[PathBuf],
    space_path: &Path,
    discovery: &FileDiscovery,
) -> Vec<FileEvent> {
    let mut result = Vec::new();

    let to_relative = |abs: &Path| -> Option<PathBuf> {
        let rel = abs.strip_prefix(space_path).ok()?;
        if discovery.should_index(rel) {
            Some(rel.to_path_buf())
        } else {
            None
        }
    };

    match kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => {
            for path in paths {
                if let Some(rel) = to_relative(path) {
                    result.push(FileEvent::Created(rel));
                }
            }
        }
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => {
            for path in paths {
                if let Some(rel) = to_relative(path) {
                    result.push(FileEvent::Modified(rel));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                let from_rel = paths[0].strip_prefix(space_path).ok().map(Path::to_path_buf);
                let to_rel = to_relative(&paths[1]);
                match (from_rel, to_rel) {
                    (Some(from), Some(to)) => {
                        result.push(FileEvent::Renamed { from, to });
                    }
                    (Some(from), None) => {
                        if from.extension().and_then(|e| e.to_str()) == Some("md") {
                            result.push(FileEvent::Deleted(from));
                        }
                    }
                    (None, Some(to)) => {
                        result.push(FileEvent::Created(to));
                    }
                    _ => {}
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in paths {
                if let Ok(rel) = path.strip_prefix(space_path) {
                    if rel.extension().and_then(|e| e.to_str()) == Some("md") {
                        result.push(FileEvent::Deleted(rel.to_path_buf()));
                    }
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in paths {
                if let Some(rel) = to_relative(path) {
                    result.push(FileEvent::Created(rel));
                }
            }
        }
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => {
            for path in paths {
                if let Ok(rel) = path.strip_prefix(space_path) {
                    if rel.extension().and_then(|e| e.to_str()) == Some("md") {
                        result.push(FileEvent::Deleted(rel.to_path_buf()));
                    }
                }
            }
        }
        _ => {}
    }

    result
}
