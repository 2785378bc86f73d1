use std::fs;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use usearch::Index;

use crate::error::{Error, Result};
use crate::graph::types::GraphMetadata;

/// Magic bytes identifying a graph store file.
pub const MAGIC: &[u8; 6] = b"LDYBUG";

/// Current store format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Create a new HNSW index with cosine similarity, `M=16`/`efConstruction=200`-equivalent
/// connectivity and expansion settings, for the given dimensionality.
pub fn create_hnsw(dimensions: usize) -> Result<Index> {
    let opts = usearch::IndexOptions {
        dimensions,
        metric: usearch::MetricKind::Cos,
        quantization: usearch::ScalarKind::F32,
        connectivity: 16,
        expansion_add: 200,
        expansion_search: 64,
        multi: false,
    };
    Index::new(&opts).map_err(|e| Error::StoreError(format!("failed to create HNSW index: {e}")))
}

/// Write a graph store file atomically: serialize to `.tmp`, fsync, then rename.
pub fn write_store(path: &Path, metadata: &GraphMetadata, hnsw: &Index) -> Result<()> {
    let meta_bytes = rkyv::to_bytes::<rkyv::rancor::Error>(metadata)
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let hnsw_len = hnsw.serialized_length();
    let mut hnsw_bytes = vec![0u8; hnsw_len];
    hnsw.save_to_buffer(&mut hnsw_bytes)
        .map_err(|e| Error::Serialization(format!("usearch save_to_buffer: {e}")))?;

    let meta_offset: u64 = HEADER_SIZE as u64;
    let meta_size: u64 = meta_bytes.len() as u64;
    let hnsw_offset: u64 = meta_offset + meta_size;
    let hnsw_size: u64 = hnsw_bytes.len() as u64;

    let mut header = [0u8; HEADER_SIZE];
    header[..6].copy_from_slice(MAGIC);
    header[6..10].copy_from_slice(&VERSION.to_le_bytes());
    header[10..18].copy_from_slice(&meta_offset.to_le_bytes());
    header[18..26].copy_from_slice(&meta_size.to_le_bytes());
    header[26..34].copy_from_slice(&hnsw_offset.to_le_bytes());
    header[34..42].copy_from_slice(&hnsw_size.to_le_bytes());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&header)?;
    file.write_all(&meta_bytes)?;
    file.write_all(&hnsw_bytes)?;
    file.sync_all()?;

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a graph store file via memory-mapping. Returns deserialized metadata and HNSW index.
pub fn load_store(path: &Path) -> Result<(GraphMetadata, Index)> {
    if !path.exists() {
        return Err(Error::not_found(format!("graph store at {}", path.display())));
    }

    let file = fs::File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < HEADER_SIZE {
        return Err(Error::StoreError("file too small for header".into()));
    }
    if &mmap[..6] != MAGIC {
        return Err(Error::StoreError("invalid magic bytes".into()));
    }

    let version = u32::from_le_bytes(mmap[6..10].try_into().unwrap());
    if version != VERSION {
        return Err(Error::StoreError(format!("unsupported version: {version}")));
    }

    let meta_offset = u64::from_le_bytes(mmap[10..18].try_into().unwrap()) as usize;
    let meta_size = u64::from_le_bytes(mmap[18..26].try_into().unwrap()) as usize;
    let hnsw_offset = u64::from_le_bytes(mmap[26..34].try_into().unwrap()) as usize;
    let hnsw_size = u64::from_le_bytes(mmap[34..42].try_into().unwrap()) as usize;

    if meta_offset + meta_size > mmap.len() || hnsw_offset + hnsw_size > mmap.len() {
        return Err(Error::StoreError("truncated file".into()));
    }

    let meta_bytes = &mmap[meta_offset..meta_offset + meta_size];
    let metadata: GraphMetadata = rkyv::from_bytes::<GraphMetadata, rkyv::rancor::Error>(meta_bytes)
        .map_err(|e| Error::Serialization(format!("rkyv deserialize: {e}")))?;

    let hnsw_bytes = &mmap[hnsw_offset..hnsw_offset + hnsw_size];
    let hnsw = create_hnsw(metadata.embedding_config.dimensions)?;
    hnsw.load_from_buffer(hnsw_bytes)
        .map_err(|e| Error::Serialization(format!("usearch load: {e}")))?;

    Ok((metadata, hnsw))
}
