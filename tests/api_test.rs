use std::fs;
use std::path::PathBuf;

use mdvdb::config::{Config, EmbeddingProviderType};
use mdvdb::dispatch::{self, HybridSearchRequest, ReadPageRequest, SearchRequest};
use mdvdb::Engine;
use tempfile::TempDir;

const DIMS: usize = 8;

fn mock_config(space_path: PathBuf, db_path: PathBuf) -> Config {
    Config {
        space_path,
        db_path,
        grpc_port: 50051,
        mcp_port: 8000,
        embedding_provider: EmbeddingProviderType::Mock,
        embedding_model: "mock-model".into(),
        embedding_dimensions: DIMS,
        embedding_batch_size: 100,
        enable_embeddings: true,
        openai_api_key: None,
        ollama_host: "http://localhost:11434".into(),
        embedding_endpoint: None,
        allow_library_management: false,
        ignore_patterns: vec![],
        watch_enabled: false,
        watch_debounce_ms: 300,
        search_default_limit: 10,
        search_min_score: 0.0,
        search_rrf_k: 60.0,
        search_weight_keyword: 0.5,
        search_weight_semantic: 0.5,
    }
}

fn setup_project() -> (TempDir, TempDir, Engine) {
    let space = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    let root = space.path();

    fs::write(
        root.join("hello.md"),
        "---\ntitle: Hello World\nstatus: published\n---\n\n## Hello\n\nThis is a test document about greetings.\n",
    )
    .unwrap();

    fs::write(
        root.join("rust.md"),
        "---\ntitle: Rust Guide\nstatus: draft\n---\n\n## Rust\n\nRust is a systems programming language.\n\n## Memory Safety\n\nRust ensures memory safety without garbage collection.\n",
    )
    .unwrap();

    let engine = Engine::open_with_config(mock_config(root.to_path_buf(), db.path().to_path_buf())).unwrap();
    (space, db, engine)
}

#[test]
fn open_with_mock_config_succeeds() {
    let space = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();

    let engine = Engine::open_with_config(mock_config(space.path().to_path_buf(), db.path().to_path_buf()));
    assert!(engine.is_ok(), "should open with mock config: {:?}", engine.err());
}

#[test]
fn status_starts_empty() {
    let (_space, _db, engine) = setup_project();
    let status = engine.status();

    assert_eq!(status.chunk_count, 0);
    assert_eq!(status.vector_count, 0);
    assert_eq!(status.embedding_config.dimensions, DIMS);
}

#[tokio::test]
async fn reindex_all_populates_graph() {
    let (_space, _db, engine) = setup_project();

    let indexed = engine.reindex_all().await.unwrap();
    assert_eq!(indexed, 2, "both files should be indexed");

    let status = engine.status();
    assert!(status.page_count > 0, "should have pages after reindex");
    assert!(status.chunk_count > 0, "should have chunks after reindex");
    assert!(status.vector_count > 0, "should have vectors after reindex");
}

#[tokio::test]
async fn reindex_all_is_idempotent_on_unchanged_tree() {
    let (_space, _db, engine) = setup_project();

    let first = engine.reindex_all().await.unwrap();
    let second = engine.reindex_all().await.unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0, "unchanged files should be skipped on the second pass");
}

#[tokio::test]
async fn rebuild_forces_full_reembed() {
    let (_space, _db, engine) = setup_project();
    engine.reindex_all().await.unwrap();

    engine.clear_all().unwrap();
    assert_eq!(engine.status().chunk_count, 0);

    let indexed = engine.reindex_all().await.unwrap();
    assert_eq!(indexed, 2, "rebuild should force every file to re-index");
}

#[tokio::test]
async fn keyword_search_via_dispatch_finds_matching_page() {
    let (_space, _db, engine) = setup_project();
    engine.reindex_all().await.unwrap();

    let response = dispatch::keyword_search(
        engine.store(),
        SearchRequest {
            keyword: "rust".into(),
            limit: None,
        },
    );

    assert!(response.success, "{:?}", response.error);
    assert!(response.results_json.contains("rust.md"));
}

#[tokio::test]
async fn hybrid_search_via_dispatch_combines_both_signals() {
    let (_space, _db, engine) = setup_project();
    engine.reindex_all().await.unwrap();

    let response = dispatch::hybrid_search(
        engine.store(),
        engine.provider_arc().as_ref(),
        engine.config(),
        HybridSearchRequest {
            query: "rust programming".into(),
            limit: None,
            filter_tags: None,
            filter_pages: None,
            fusion_method: None,
            semantic_weight: None,
            keyword_weight: None,
        },
    )
    .await;

    assert!(response.success, "{:?}", response.error);
}

#[tokio::test]
async fn read_page_rejects_path_traversal() {
    let (_space, _db, engine) = setup_project();
    engine.reindex_all().await.unwrap();

    let response = dispatch::read_page(
        engine.store(),
        engine.config(),
        ReadPageRequest {
            page_name: "../../etc/passwd".into(),
        },
    );

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Invalid page name"));
}

#[tokio::test]
async fn read_page_returns_indexed_content() {
    let (_space, _db, engine) = setup_project();
    engine.reindex_all().await.unwrap();

    let response = dispatch::read_page(
        engine.store(),
        engine.config(),
        ReadPageRequest {
            page_name: "hello".into(),
        },
    );

    assert!(response.success, "{:?}", response.error);
    assert!(response.content.contains("greetings"));
}
