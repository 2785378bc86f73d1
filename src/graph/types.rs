use std::collections::HashMap;
use std::time::SystemTime;

use crate::chunker::Chunk;
use crate::parser::MarkdownFile;

/// A chunk node: the unit of retrieval, one per `##` section of a page.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct ChunkNode {
    pub id: String,
    pub file_path: String,
    pub header: String,
    pub content: String,
    pub chunk_order: usize,
    /// Frontmatter of the owning page, as a JSON string (empty object if absent).
    pub frontmatter: String,
}

/// A page node: one per markdown file, keyed by its wikilink-resolvable name (file stem).
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct PageNode {
    pub name: String,
}

/// A tag node, keyed by lowercased tag text.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct TagNode {
    pub name: String,
}

/// A folder node, keyed by its path relative to the space root.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct FolderNode {
    pub name: String,
    pub path: String,
    pub has_index_page: bool,
}

/// An inline-attribute node: `[name: value]` attached to one chunk.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct AttributeNode {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// A fenced data-block node: ```` ```#tag ```` YAML body attached to one chunk.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct DataBlockNode {
    pub id: String,
    pub tag: String,
    /// YAML body re-serialized as a JSON string.
    pub data: String,
    pub file_path: String,
}

/// All directed edges in the graph, keyed by source id, as adjacency lists.
///
/// Edge tables mirror the node/relationship schema: `LINKS_TO`, `PAGE_LINKS_TO`,
/// `HAS_CHUNK` (with a `chunk_order` property carried on the source [`ChunkNode`]),
/// `TAGGED`, `EMBEDS` (with a `header` property), `HAS_ATTRIBUTE`, `HAS_DATA_BLOCK`,
/// `DATA_TAGGED`, `CONTAINS`, `FOLDER_CONTAINS_PAGE`, `IN_FOLDER`.
#[derive(Debug, Clone, Default, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct GraphEdges {
    /// Chunk id -> page names it wikilinks to.
    pub links_to: HashMap<String, Vec<String>>,
    /// Page name -> page names its chunks wikilink to (aggregated view of `links_to`).
    pub page_links_to: HashMap<String, Vec<String>>,
    /// File path -> chunk ids belonging to it, in chunk order.
    pub has_chunk: HashMap<String, Vec<String>>,
    /// Chunk id -> tag names.
    pub tagged: HashMap<String, Vec<String>>,
    /// Chunk id -> (target page name, header) transclusion targets.
    pub embeds: HashMap<String, Vec<(String, String)>>,
    /// Chunk id -> attribute ids.
    pub has_attribute: HashMap<String, Vec<String>>,
    /// Chunk id -> data block ids.
    pub has_data_block: HashMap<String, Vec<String>>,
    /// Data block id -> tag name.
    pub data_tagged: HashMap<String, String>,
    /// Folder path -> child folder paths.
    pub contains: HashMap<String, Vec<String>>,
    /// Folder path -> page names directly inside it.
    pub folder_contains_page: HashMap<String, Vec<String>>,
    /// Chunk id -> folder path.
    pub in_folder: HashMap<String, String>,
}

/// Embedding configuration stored alongside the graph and used for JSON output.
#[derive(
    Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, serde::Serialize,
)]
#[rkyv(derive(Debug))]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

/// Serialized metadata region of the graph store file (everything except vectors,
/// which live in the companion HNSW region of the same file).
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct GraphMetadata {
    pub chunks: HashMap<String, ChunkNode>,
    pub pages: HashMap<String, PageNode>,
    pub tags: HashMap<String, TagNode>,
    pub folders: HashMap<String, FolderNode>,
    pub attributes: HashMap<String, AttributeNode>,
    pub data_blocks: HashMap<String, DataBlockNode>,
    pub edges: GraphEdges,
    /// File path -> content hash, used by the watcher's change-detection gate.
    pub file_hashes: HashMap<String, String>,
    /// File path -> chunk ids, mirrors `edges.has_chunk` keyed the same way for convenience.
    pub file_chunk_ids: HashMap<String, Vec<String>>,
    /// Page name -> owning file path, the inverse of [`page_name_for_file`].
    pub page_files: HashMap<String, String>,
    /// Chunk id -> the u64 key it was added to the HNSW index under.
    pub vector_keys: HashMap<String, u64>,
    /// Next unused HNSW key, monotonically increasing so keys are never reused.
    pub next_vector_key: u64,
    pub embedding_config: EmbeddingConfig,
    pub last_updated: u64,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        Self {
            chunks: HashMap::new(),
            pages: HashMap::new(),
            tags: HashMap::new(),
            folders: HashMap::new(),
            attributes: HashMap::new(),
            data_blocks: HashMap::new(),
            edges: GraphEdges::default(),
            file_hashes: HashMap::new(),
            file_chunk_ids: HashMap::new(),
            page_files: HashMap::new(),
            vector_keys: HashMap::new(),
            next_vector_key: 0,
            embedding_config: EmbeddingConfig {
                provider: "Mock".to_string(),
                model: "mock".to_string(),
                dimensions: 8,
            },
            last_updated: 0,
        }
    }
}

/// Status snapshot returned by `GraphStore::status()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphStatus {
    pub page_count: usize,
    pub chunk_count: usize,
    pub tag_count: usize,
    pub folder_count: usize,
    pub vector_count: usize,
    pub last_updated: u64,
    pub embedding_config: EmbeddingConfig,
}

pub(crate) fn chunk_node_id(file_path: &str, header: &str) -> String {
    format!("{file_path}#{header}")
}

pub fn page_name_for_file(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}

pub(crate) fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ChunkNode {
    pub(crate) fn from_chunk(chunk: &Chunk, frontmatter_json: &str) -> Self {
        Self {
            id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            header: chunk.header.clone(),
            content: chunk.content.clone(),
            chunk_order: chunk.chunk_order,
            frontmatter: frontmatter_json.to_string(),
        }
    }
}

pub(crate) fn frontmatter_json(file: &MarkdownFile) -> String {
    file.frontmatter
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string())
}
