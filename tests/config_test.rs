use std::fs;

use mdvdb::config::{Config, EmbeddingProviderType};
use mdvdb::Error;
use serial_test::serial;
use tempfile::TempDir;

/// Every env var `Config::load` reads, cleared before each test for isolation.
const ALL_ENV_VARS: &[&str] = &[
    "SPACE_PATH",
    "DB_PATH",
    "GRPC_PORT",
    "MCP_PORT",
    "EMBEDDING_PROVIDER",
    "EMBEDDING_MODEL",
    "EMBEDDING_DIMENSIONS",
    "EMBEDDING_BATCH_SIZE",
    "ENABLE_EMBEDDINGS",
    "OPENAI_API_KEY",
    "OLLAMA_HOST",
    "EMBEDDING_ENDPOINT",
    "ALLOW_LIBRARY_MANAGEMENT",
    "IGNORE_PATTERNS",
    "WATCH_ENABLED",
    "WATCH_DEBOUNCE_MS",
    "SEARCH_DEFAULT_LIMIT",
    "SEARCH_MIN_SCORE",
    "SEARCH_RRF_K",
    "SEARCH_WEIGHT_KEYWORD",
    "SEARCH_WEIGHT_SEMANTIC",
];

fn clear_env() {
    for var in ALL_ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_applied_when_no_config() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    let config = Config::load(tmp.path()).unwrap();

    assert_eq!(config.embedding_provider, EmbeddingProviderType::Remote);
    assert_eq!(config.embedding_model, "text-embedding-3-small");
    assert_eq!(config.embedding_dimensions, 1536);
    assert_eq!(config.embedding_batch_size, 100);
    assert!(config.enable_embeddings);
    assert_eq!(config.openai_api_key, None);
    assert_eq!(config.ollama_host, "http://localhost:11434");
    assert_eq!(config.embedding_endpoint, None);
    assert!(!config.allow_library_management);
    assert!(config.ignore_patterns.is_empty());
    assert!(config.watch_enabled);
    assert_eq!(config.watch_debounce_ms, 5000);
    assert_eq!(config.search_default_limit, 10);
    assert_eq!(config.search_min_score, 0.0);
    assert_eq!(config.search_rrf_k, 60.0);
    assert_eq!(config.search_weight_keyword, 0.5);
    assert_eq!(config.search_weight_semantic, 0.5);
}

#[test]
#[serial]
fn dotenv_file_overrides_defaults() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".env"),
        "EMBEDDING_MODEL=custom-model\n\
         EMBEDDING_DIMENSIONS=768\n\
         SEARCH_DEFAULT_LIMIT=20\n\
         WATCH_ENABLED=false\n",
    )
    .unwrap();

    let config = Config::load(tmp.path()).unwrap();
    assert_eq!(config.embedding_model, "custom-model");
    assert_eq!(config.embedding_dimensions, 768);
    assert_eq!(config.search_default_limit, 20);
    assert!(!config.watch_enabled);
}

#[test]
#[serial]
fn shell_env_overrides_dotenv_file() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".env"),
        "EMBEDDING_MODEL=file-model\nEMBEDDING_DIMENSIONS=768\n",
    )
    .unwrap();

    // dotenvy::from_path does not override vars already set in the shell.
    std::env::set_var("EMBEDDING_MODEL", "env-model");
    std::env::set_var("EMBEDDING_DIMENSIONS", "256");

    let config = Config::load(tmp.path()).unwrap();
    assert_eq!(config.embedding_model, "env-model");
    assert_eq!(config.embedding_dimensions, 256);

    clear_env();
}

#[test]
#[serial]
fn comma_separated_ignore_patterns_trimmed() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("IGNORE_PATTERNS", "drafts/ , archive/ ");

    let config = Config::load(tmp.path()).unwrap();
    assert_eq!(config.ignore_patterns, vec!["drafts/".to_string(), "archive/".to_string()]);

    clear_env();
}

#[test]
#[serial]
fn case_insensitive_provider() {
    clear_env();
    let tmp = TempDir::new().unwrap();

    for variant in &["OpenAI", "OPENAI", "openai", "remote"] {
        std::env::set_var("EMBEDDING_PROVIDER", variant);
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(
            config.embedding_provider,
            EmbeddingProviderType::Remote,
            "failed for variant: {variant}"
        );
    }

    clear_env();
}

#[test]
#[serial]
fn local_provider_defaults_to_bge_model() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("EMBEDDING_PROVIDER", "local");

    let config = Config::load(tmp.path()).unwrap();
    assert_eq!(config.embedding_provider, EmbeddingProviderType::Local);
    assert_eq!(config.embedding_model, "BAAI/bge-small-en-v1.5");

    clear_env();
}

#[test]
#[serial]
fn invalid_dimensions_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("EMBEDDING_DIMENSIONS", "0");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("embedding_dimensions")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn invalid_dimensions_non_numeric() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("EMBEDDING_DIMENSIONS", "abc");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("EMBEDDING_DIMENSIONS")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn unknown_provider_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("EMBEDDING_PROVIDER", "unknown");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("unknown")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn zero_batch_size_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("EMBEDDING_BATCH_SIZE", "0");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("embedding_batch_size")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn score_out_of_range_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("SEARCH_MIN_SCORE", "1.5");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("search_min_score")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn weights_out_of_range_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("SEARCH_WEIGHT_KEYWORD", "2.0");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("search_weight")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn zero_rrf_k_rejected() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    std::env::set_var("SEARCH_RRF_K", "0");

    let result = Config::load(tmp.path());
    match result.unwrap_err() {
        Error::ConfigError(msg) => assert!(msg.contains("search_rrf_k")),
        other => panic!("expected Error::ConfigError, got: {other:?}"),
    }

    clear_env();
}

#[test]
#[serial]
fn missing_dotenv_file_ok() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    let result = Config::load(tmp.path());
    assert!(result.is_ok());
    clear_env();
}

#[test]
#[serial]
fn boolean_env_accepts_common_spellings() {
    clear_env();
    let tmp = TempDir::new().unwrap();

    for (variant, expected) in [("true", true), ("1", true), ("yes", true), ("false", false), ("0", false), ("no", false)] {
        std::env::set_var("WATCH_ENABLED", variant);
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.watch_enabled, expected, "failed for variant: {variant}");
    }

    clear_env();
}

#[test]
#[serial]
fn api_key_read_from_env_file() {
    clear_env();
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".env"), "OPENAI_API_KEY=sk-test-from-dotenv\n").unwrap();

    let config = Config::load(tmp.path()).unwrap();
    assert_eq!(config.openai_api_key, Some("sk-test-from-dotenv".into()));

    clear_env();
}
