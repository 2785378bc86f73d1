use std::collections::HashMap;
use std::path::PathBuf;

use mdvdb::chunker::Chunk;
use mdvdb::config::{Config, EmbeddingProviderType};
use mdvdb::graph::GraphStore;
use mdvdb::search::{hybrid_search, keyword_search, semantic_search, FusionMode, SearchFilter};
use tempfile::TempDir;

const DIMS: usize = 4;

fn test_config() -> Config {
    Config {
        space_path: PathBuf::from("/space"),
        db_path: PathBuf::from("/data/ladybug"),
        grpc_port: 50051,
        mcp_port: 8000,
        embedding_provider: EmbeddingProviderType::Mock,
        embedding_model: "mock".into(),
        embedding_dimensions: DIMS,
        embedding_batch_size: 10,
        enable_embeddings: true,
        openai_api_key: None,
        ollama_host: "http://localhost:11434".into(),
        embedding_endpoint: None,
        allow_library_management: false,
        ignore_patterns: vec![],
        watch_enabled: false,
        watch_debounce_ms: 5000,
        search_default_limit: 10,
        search_min_score: 0.0,
        search_rrf_k: 60.0,
        search_weight_keyword: 0.5,
        search_weight_semantic: 0.5,
    }
}

fn chunk(file: &str, folder: &str, header: &str, content: &str, tags: Vec<&str>) -> Chunk {
    Chunk {
        id: format!("{file}#{header}"),
        file_path: file.to_string(),
        folder_path: folder.to_string(),
        header: header.to_string(),
        chunk_order: 0,
        content: content.to_string(),
        links: vec![],
        tags: tags.into_iter().map(String::from).collect(),
        transclusions: vec![],
        attributes: vec![],
        data_blocks: vec![],
    }
}

fn unit_vector(index: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[index % DIMS] = 1.0;
    v
}

fn build_store() -> (TempDir, GraphStore) {
    let dir = TempDir::new().unwrap();
    let store = GraphStore::create(&dir.path().join("g.ldg"), &test_config()).unwrap();

    let mut rust_embeddings = HashMap::new();
    rust_embeddings.insert("Rust.md#Async".to_string(), unit_vector(0));
    store
        .upsert_page(
            "Rust.md",
            "lang",
            "{}",
            &[chunk(
                "Rust.md",
                "lang",
                "Async",
                "Rust async runtimes use a reactor and an executor.",
                vec!["rust"],
            )],
            &rust_embeddings,
            "h1",
        )
        .unwrap();

    let mut cooking_embeddings = HashMap::new();
    cooking_embeddings.insert("Cooking.md#Pasta".to_string(), unit_vector(1));
    store
        .upsert_page(
            "Cooking.md",
            "food",
            "{}",
            &[chunk(
                "Cooking.md",
                "food",
                "Pasta",
                "Boil pasta in salted water for ten minutes.",
                vec!["food"],
            )],
            &cooking_embeddings,
            "h2",
        )
        .unwrap();

    (dir, store)
}

#[test]
fn keyword_search_respects_tag_filter() {
    let (_dir, store) = build_store();
    let filter = SearchFilter {
        tags: vec!["food".into()],
        page: None,
        scope: None,
    };
    let hits = keyword_search(&store, "ten minutes pasta", &filter).unwrap();
    assert!(hits.iter().all(|h| h.file_path == "Cooking.md"));
}

#[test]
fn keyword_search_respects_page_filter() {
    let (_dir, store) = build_store();
    let filter = SearchFilter {
        tags: vec![],
        page: Some("Rust".into()),
        scope: None,
    };
    let hits = keyword_search(&store, "pasta reactor", &filter).unwrap();
    assert!(hits.iter().all(|h| h.file_path == "Rust.md"));
}

#[test]
fn keyword_search_respects_scope_filter() {
    let (_dir, store) = build_store();
    let filter = SearchFilter {
        tags: vec![],
        page: None,
        scope: Some("food".into()),
    };
    let hits = keyword_search(&store, "pasta reactor", &filter).unwrap();
    assert!(hits.iter().all(|h| h.file_path == "Cooking.md"));
}

#[test]
fn semantic_search_returns_closest_vector() {
    let (_dir, store) = build_store();
    let query_vector = unit_vector(0);
    let hits = semantic_search(&store, &query_vector, 5, &SearchFilter::default()).unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].file_path, "Rust.md");
}

#[test]
fn semantic_search_honors_tag_filter() {
    let (_dir, store) = build_store();
    let query_vector = unit_vector(0);
    let filter = SearchFilter {
        tags: vec!["food".into()],
        page: None,
        scope: None,
    };
    let hits = semantic_search(&store, &query_vector, 5, &filter).unwrap();

    assert!(hits.iter().all(|h| h.file_path == "Cooking.md"));
}

#[test]
fn hybrid_search_rrf_combines_both_rankings() {
    let (_dir, store) = build_store();
    let keyword_hits = keyword_search(&store, "pasta", &SearchFilter::default()).unwrap();
    let semantic_hits = semantic_search(&store, &unit_vector(0), 5, &SearchFilter::default()).unwrap();

    let fused = hybrid_search(&keyword_hits, &semantic_hits, FusionMode::Rrf, 60.0, 0.5, 0.5);

    assert!(!fused.is_empty());
    let ids: Vec<&str> = fused.iter().map(|h| h.chunk_id.as_str()).collect();
    assert!(ids.contains(&"Rust.md#Async"));
    assert!(ids.contains(&"Cooking.md#Pasta"));
}

#[test]
fn hybrid_search_weighted_combines_both_rankings() {
    let (_dir, store) = build_store();
    let keyword_hits = keyword_search(&store, "pasta", &SearchFilter::default()).unwrap();
    let semantic_hits = semantic_search(&store, &unit_vector(0), 5, &SearchFilter::default()).unwrap();

    let fused = hybrid_search(&keyword_hits, &semantic_hits, FusionMode::Weighted, 60.0, 0.5, 0.5);

    assert!(!fused.is_empty());
    assert!(fused.iter().all(|h| h.score <= 1.0 && h.score >= 0.0));
}
