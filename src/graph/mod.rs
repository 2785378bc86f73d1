pub mod storage;
pub mod store;
pub mod types;

pub use store::GraphStore;
pub use types::{
    page_name_for_file, AttributeNode, ChunkNode, DataBlockNode, EmbeddingConfig, FolderNode,
    GraphMetadata, GraphStatus, PageNode, TagNode,
};
