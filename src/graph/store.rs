use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use usearch::Index as HnswIndex;

use crate::chunker::Chunk;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::storage;
use crate::graph::types::{
    chunk_node_id, current_unix_time, page_name_for_file, AttributeNode, ChunkNode, DataBlockNode,
    EmbeddingConfig, FolderNode, GraphMetadata, GraphStatus, PageNode, TagNode,
};

struct GraphState {
    metadata: GraphMetadata,
    hnsw: HnswIndex,
}

/// The typed knowledge graph over a notes space: chunks, pages, tags, folders,
/// attributes and data blocks, plus the vector index used for semantic search.
///
/// All mutation is transactional at file granularity: [`GraphStore::upsert_page`]
/// replaces every node and edge owned by one file atomically under a single
/// write-lock hold, and [`GraphStore::delete_page`] removes them the same way,
/// sweeping any nodes left with no remaining incoming edges.
pub struct GraphStore {
    path: PathBuf,
    state: RwLock<GraphState>,
}

impl GraphStore {
    /// Open an existing graph store file.
    pub fn open(path: &Path) -> Result<Self> {
        let (metadata, hnsw) = storage::load_store(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(GraphState { metadata, hnsw }),
        })
    }

    /// Create a new, empty graph store file.
    pub fn create(path: &Path, config: &Config) -> Result<Self> {
        let metadata = GraphMetadata {
            embedding_config: EmbeddingConfig {
                provider: format!("{:?}", config.embedding_provider),
                model: config.embedding_model.clone(),
                dimensions: config.embedding_dimensions,
            },
            last_updated: current_unix_time(),
            ..Default::default()
        };

        let hnsw = storage::create_hnsw(config.embedding_dimensions)?;
        hnsw.reserve(64)
            .map_err(|e| Error::Serialization(format!("usearch reserve: {e}")))?;

        storage::write_store(path, &metadata, &hnsw)?;

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(GraphState { metadata, hnsw }),
        })
    }

    /// Open an existing graph store, or create a new one if none exists yet.
    pub fn open_or_create(path: &Path, config: &Config) -> Result<Self> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(Error::NotFound(_)) => Self::create(path, config),
            Err(e) => Err(e),
        }
    }

    /// Persist the current in-memory state back to disk.
    pub fn save(&self) -> Result<()> {
        let state = self.state.read();
        storage::write_store(&self.path, &state.metadata, &state.hnsw)
    }

    /// Materialize every folder in `paths` (and their ancestors) as `Folder`
    /// nodes, and mark `has_index_page` for every folder with an entry in
    /// `index_pages`. Run after a full reindex so the folder tree reflects
    /// every directory in the space, not just the ones that happened to
    /// contain a freshly-upserted file.
    pub fn upsert_folders(&self, paths: &[String], index_pages: &std::collections::HashMap<String, String>) -> Result<()> {
        let mut state = self.state.write();
        for path in paths {
            ensure_folder_chain(&mut state.metadata, path);
        }
        for folder_path in index_pages.keys() {
            ensure_folder_chain(&mut state.metadata, folder_path);
            if let Some(folder) = state.metadata.folders.get_mut(folder_path) {
                folder.has_index_page = true;
            }
        }
        state.metadata.last_updated = current_unix_time();
        Ok(())
    }

    /// Replace every node and edge owned by `file_path` with the given chunks,
    /// in a single atomic pass. Pass an empty `embeddings` map when running
    /// with embeddings disabled; chunks are still indexed, just not made
    /// semantically searchable.
    pub fn upsert_page(
        &self,
        file_path: &str,
        folder_path: &str,
        frontmatter_json: &str,
        chunks: &[Chunk],
        embeddings: &std::collections::HashMap<String, Vec<f32>>,
        content_hash: &str,
    ) -> Result<()> {
        let mut state = self.state.write();
        remove_file_locked(&mut state, file_path);

        let page_name = page_name_for_file(file_path);
        state.metadata.pages.insert(
            page_name.clone(),
            PageNode {
                name: page_name.clone(),
            },
        );
        state.metadata.page_files.insert(page_name.clone(), file_path.to_string());

        ensure_folder_chain(&mut state.metadata, folder_path);
        if !folder_path.is_empty() {
            state
                .metadata
                .edges
                .folder_contains_page
                .entry(folder_path.to_string())
                .or_default()
                .push(page_name.clone());
        }

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = chunk_node_id(file_path, &chunk.header);
            chunk_ids.push(id.clone());

            state
                .metadata
                .chunks
                .insert(id.clone(), ChunkNode::from_chunk(chunk, frontmatter_json));

            state
                .metadata
                .edges
                .in_folder
                .insert(id.clone(), folder_path.to_string());

            for tag in &chunk.tags {
                state
                    .metadata
                    .tags
                    .entry(tag.clone())
                    .or_insert_with(|| TagNode { name: tag.clone() });
                state
                    .metadata
                    .edges
                    .tagged
                    .entry(id.clone())
                    .or_default()
                    .push(tag.clone());
            }

            for link in &chunk.links {
                let target = link.target.clone();
                state
                    .metadata
                    .pages
                    .entry(target.clone())
                    .or_insert_with(|| PageNode { name: target.clone() });
                state
                    .metadata
                    .edges
                    .links_to
                    .entry(id.clone())
                    .or_default()
                    .push(target.clone());
                let page_links = state
                    .metadata
                    .edges
                    .page_links_to
                    .entry(page_name.clone())
                    .or_default();
                if !page_links.contains(&target) {
                    page_links.push(target);
                }
            }

            for transclusion in &chunk.transclusions {
                state
                    .metadata
                    .pages
                    .entry(transclusion.target_page.clone())
                    .or_insert_with(|| PageNode {
                        name: transclusion.target_page.clone(),
                    });
                state.metadata.edges.embeds.entry(id.clone()).or_default().push((
                    transclusion.target_page.clone(),
                    transclusion.target_header.clone().unwrap_or_default(),
                ));
            }

            for attr in &chunk.attributes {
                let attr_id = format!("{id}::attr::{}", attr.name);
                state.metadata.attributes.insert(
                    attr_id.clone(),
                    AttributeNode {
                        id: attr_id.clone(),
                        name: attr.name.clone(),
                        value: attr.value.clone(),
                    },
                );
                state
                    .metadata
                    .edges
                    .has_attribute
                    .entry(id.clone())
                    .or_default()
                    .push(attr_id);
            }

            for block in &chunk.data_blocks {
                let block_id = format!("{id}::data::{}", block.tag);
                state.metadata.data_blocks.insert(
                    block_id.clone(),
                    DataBlockNode {
                        id: block_id.clone(),
                        tag: block.tag.clone(),
                        data: block.data.to_string(),
                        file_path: file_path.to_string(),
                    },
                );
                state
                    .metadata
                    .edges
                    .has_data_block
                    .entry(id.clone())
                    .or_default()
                    .push(block_id.clone());
                state
                    .metadata
                    .tags
                    .entry(block.tag.clone())
                    .or_insert_with(|| TagNode {
                        name: block.tag.clone(),
                    });
                state.metadata.edges.data_tagged.insert(block_id, block.tag.clone());
            }

            if let Some(vector) = embeddings.get(&id) {
                let key = state.metadata.next_vector_key;
                state
                    .hnsw
                    .add(key, vector)
                    .map_err(|e| Error::StoreError(format!("usearch add: {e}")))?;
                state.metadata.vector_keys.insert(id.clone(), key);
                state.metadata.next_vector_key += 1;
            }
        }

        state
            .metadata
            .edges
            .has_chunk
            .insert(file_path.to_string(), chunk_ids.clone());
        state.metadata.file_chunk_ids.insert(file_path.to_string(), chunk_ids);
        state
            .metadata
            .file_hashes
            .insert(file_path.to_string(), content_hash.to_string());
        state.metadata.last_updated = current_unix_time();

        Ok(())
    }

    /// Remove every node and edge owned by `file_path`, then sweep any tag,
    /// page, attribute or data-block node left with no remaining incoming
    /// edges. Idempotent: deleting a file that isn't indexed is a no-op.
    pub fn delete_page(&self, file_path: &str) -> Result<()> {
        let mut state = self.state.write();
        remove_file_locked(&mut state, file_path);
        state.metadata.last_updated = current_unix_time();
        Ok(())
    }

    /// Detach-delete every node of every label and reset the vector index,
    /// leaving an empty graph with the same embedding configuration. Used by
    /// the `--rebuild` entry point to force a full re-embed of every file.
    pub fn clear_all(&self) -> Result<()> {
        let mut state = self.state.write();
        let dimensions = state.metadata.embedding_config.dimensions;
        let embedding_config = state.metadata.embedding_config.clone();

        state.metadata = GraphMetadata {
            embedding_config,
            last_updated: current_unix_time(),
            ..Default::default()
        };
        state.hnsw = storage::create_hnsw(dimensions)?;
        state
            .hnsw
            .reserve(64)
            .map_err(|e| Error::Serialization(format!("usearch reserve: {e}")))?;

        Ok(())
    }

    /// Content hash recorded for `file_path` on its last successful upsert, if any.
    pub fn file_hash(&self, file_path: &str) -> Option<String> {
        self.state.read().metadata.file_hashes.get(file_path).cloned()
    }

    /// All chunks currently indexed, in arbitrary order.
    pub fn all_chunks(&self) -> Vec<ChunkNode> {
        self.state.read().metadata.chunks.values().cloned().collect()
    }

    /// A single chunk by id.
    pub fn chunk(&self, id: &str) -> Option<ChunkNode> {
        self.state.read().metadata.chunks.get(id).cloned()
    }

    /// Total number of indexed chunks (the BM25 corpus size).
    pub fn total_chunks(&self) -> usize {
        self.state.read().metadata.chunks.len()
    }

    /// Tag names attached to a chunk.
    pub fn tags_for_chunk(&self, chunk_id: &str) -> Vec<String> {
        self.state
            .read()
            .metadata
            .edges
            .tagged
            .get(chunk_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Folder path a chunk belongs to.
    pub fn folder_for_chunk(&self, chunk_id: &str) -> Option<String> {
        self.state.read().metadata.edges.in_folder.get(chunk_id).cloned()
    }

    /// Pages that link to `page_name` (the reverse of `PAGE_LINKS_TO`).
    pub fn backlinks(&self, page_name: &str) -> Vec<String> {
        self.state
            .read()
            .metadata
            .edges
            .page_links_to
            .iter()
            .filter(|(_, targets)| targets.iter().any(|t| t == page_name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// All chunks belonging to a page, ordered by `chunk_order`.
    pub fn read_page(&self, page_name: &str) -> Option<Vec<ChunkNode>> {
        let state = self.state.read();
        let file_path = state.metadata.page_files.get(page_name)?;
        let chunk_ids = state.metadata.file_chunk_ids.get(file_path)?;
        let mut chunks: Vec<ChunkNode> = chunk_ids
            .iter()
            .filter_map(|id| state.metadata.chunks.get(id).cloned())
            .collect();
        chunks.sort_by_key(|c| c.chunk_order);
        Some(chunks)
    }

    /// A folder node plus the page names and child folder paths directly inside it.
    pub fn folder_context(&self, folder_path: &str) -> Option<(FolderNode, Vec<String>, Vec<String>)> {
        let state = self.state.read();
        let folder = state.metadata.folders.get(folder_path)?.clone();
        let pages = state
            .metadata
            .edges
            .folder_contains_page
            .get(folder_path)
            .cloned()
            .unwrap_or_default();
        let children = state
            .metadata
            .edges
            .contains
            .get(folder_path)
            .cloned()
            .unwrap_or_default();
        Some((folder, pages, children))
    }

    /// Chunk ids whose folder path equals `scope` or is nested under it.
    pub fn chunks_in_scope(&self, scope: &str) -> Vec<String> {
        let state = self.state.read();
        state
            .metadata
            .edges
            .in_folder
            .iter()
            .filter(|(_, folder)| folder.as_str() == scope || folder.starts_with(&format!("{scope}/")))
            .map(|(chunk_id, _)| chunk_id.clone())
            .collect()
    }

    /// Nearest-neighbor search over the vector index. Returns `(chunk_id, score)`
    /// pairs sorted by descending similarity, where `score` is `1.0 - cosine_distance`.
    pub fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let state = self.state.read();
        let matches = state
            .hnsw
            .search(query, k)
            .map_err(|e| Error::StoreError(format!("usearch search: {e}")))?;

        let key_to_id: std::collections::HashMap<u64, &String> = state
            .metadata
            .vector_keys
            .iter()
            .map(|(id, key)| (*key, id))
            .collect();

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                key_to_id.get(key).map(|id| ((*id).clone(), 1.0 - distance))
            })
            .collect())
    }

    /// A narrow, hardcoded subset of read-only graph queries, identified by
    /// exact query text rather than a full Cypher grammar. Anything else is
    /// rejected with [`Error::InvalidArgument`].
    pub fn cypher(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        let state = self.state.read();
        match query.trim() {
            "MATCH (p:Page) RETURN p.name AS name" => Ok(state
                .metadata
                .pages
                .keys()
                .map(|name| serde_json::json!({ "name": name }))
                .collect()),
            "MATCH (t:Tag) RETURN t.name AS name" => Ok(state
                .metadata
                .tags
                .keys()
                .map(|name| serde_json::json!({ "name": name }))
                .collect()),
            other => Err(Error::invalid_argument(format!(
                "unsupported query: {other}"
            ))),
        }
    }

    /// A snapshot of graph size for status reporting.
    pub fn status(&self) -> GraphStatus {
        let state = self.state.read();
        GraphStatus {
            page_count: state.metadata.pages.len(),
            chunk_count: state.metadata.chunks.len(),
            tag_count: state.metadata.tags.len(),
            folder_count: state.metadata.folders.len(),
            vector_count: state.metadata.vector_keys.len(),
            last_updated: state.metadata.last_updated,
            embedding_config: state.metadata.embedding_config.clone(),
        }
    }
}

/// Remove every node and edge owned by `file_path` from an already-locked state,
/// then sweep orphaned tag/page/attribute/data-block nodes.
fn remove_file_locked(state: &mut GraphState, file_path: &str) {
    let Some(chunk_ids) = state.metadata.file_chunk_ids.remove(file_path) else {
        return;
    };
    state.metadata.edges.has_chunk.remove(file_path);
    state.metadata.file_hashes.remove(file_path);

    let page_name = page_name_for_file(file_path);
    state.metadata.page_files.remove(&page_name);
    state.metadata.pages.remove(&page_name);
    state.metadata.edges.page_links_to.remove(&page_name);
    for pages in state.metadata.edges.folder_contains_page.values_mut() {
        pages.retain(|p| p != &page_name);
    }

    for chunk_id in &chunk_ids {
        state.metadata.chunks.remove(chunk_id);
        state.metadata.edges.links_to.remove(chunk_id);
        state.metadata.edges.tagged.remove(chunk_id);
        state.metadata.edges.embeds.remove(chunk_id);
        state.metadata.edges.in_folder.remove(chunk_id);

        if let Some(attr_ids) = state.metadata.edges.has_attribute.remove(chunk_id) {
            for attr_id in attr_ids {
                state.metadata.attributes.remove(&attr_id);
            }
        }
        if let Some(block_ids) = state.metadata.edges.has_data_block.remove(chunk_id) {
            for block_id in block_ids {
                state.metadata.data_blocks.remove(&block_id);
                state.metadata.edges.data_tagged.remove(&block_id);
            }
        }

        if let Some(key) = state.metadata.vector_keys.remove(chunk_id) {
            let _ = state.hnsw.remove(key);
        }
    }

    cleanup_orphan_tags(&mut state.metadata);
    cleanup_orphan_pages(&mut state.metadata);
}

fn cleanup_orphan_tags(metadata: &mut GraphMetadata) {
    let referenced: std::collections::HashSet<&String> = metadata
        .edges
        .tagged
        .values()
        .flatten()
        .chain(metadata.edges.data_tagged.values())
        .collect();
    metadata.tags.retain(|name, _| referenced.contains(name));
}

fn cleanup_orphan_pages(metadata: &mut GraphMetadata) {
    let mut referenced: std::collections::HashSet<String> =
        metadata.page_files.keys().cloned().collect();
    referenced.extend(metadata.edges.links_to.values().flatten().cloned());
    referenced.extend(metadata.edges.page_links_to.values().flatten().cloned());
    referenced.extend(metadata.edges.embeds.values().flatten().map(|(p, _)| p.clone()));
    metadata.pages.retain(|name, _| referenced.contains(name));
}

/// Ensure a `FolderNode` exists for `folder_path` and every ancestor folder,
/// linking each via `CONTAINS`.
fn ensure_folder_chain(metadata: &mut GraphMetadata, folder_path: &str) {
    if folder_path.is_empty() {
        return;
    }
    let components: Vec<&str> = folder_path.split('/').collect();
    let mut parent: Option<String> = None;
    let mut built = String::new();

    for component in components {
        if !built.is_empty() {
            built.push('/');
        }
        built.push_str(component);

        metadata.folders.entry(built.clone()).or_insert_with(|| FolderNode {
            name: component.to_string(),
            path: built.clone(),
            has_index_page: false,
        });

        if let Some(parent_path) = &parent {
            let children = metadata.edges.contains.entry(parent_path.clone()).or_default();
            if !children.contains(&built) {
                children.push(built.clone());
            }
        }
        parent = Some(built.clone());
    }
}
