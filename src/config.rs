use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// Supported embedding provider backends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EmbeddingProviderType {
    /// Hosted API (OpenAI-compatible).
    Remote,
    /// Locally-hosted model (Ollama-compatible).
    Local,
    /// Deterministic hash-based vectors, for tests and offline runs.
    Mock,
}

impl FromStr for EmbeddingProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "remote" => Ok(Self::Remote),
            "ollama" | "local" => Ok(Self::Local),
            "mock" => Ok(Self::Mock),
            other => Err(Error::ConfigError(format!(
                "unknown embedding provider '{other}': expected openai, ollama, or mock"
            ))),
        }
    }
}

/// Full configuration for the engine, loaded from environment / `.env` file / defaults.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Root of the markdown notes tree to index.
    pub space_path: PathBuf,
    /// Directory the graph store persists into.
    pub db_path: PathBuf,
    /// Port the (excluded) gRPC transport would bind.
    pub grpc_port: u16,
    /// Port the (excluded) MCP/tool-server transport would bind.
    pub mcp_port: u16,

    pub embedding_provider: EmbeddingProviderType,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,
    pub enable_embeddings: bool,
    pub openai_api_key: Option<String>,
    pub ollama_host: String,
    pub embedding_endpoint: Option<String>,

    /// Whether library-install/proposal write operations are permitted.
    pub allow_library_management: bool,

    pub ignore_patterns: Vec<String>,
    pub watch_enabled: bool,
    /// Debounce window, in milliseconds, before an accepted filesystem event is processed.
    pub watch_debounce_ms: u64,

    pub search_default_limit: usize,
    pub search_min_score: f64,
    pub search_rrf_k: f64,
    /// Default keyword-score weight for weighted-fusion hybrid search.
    pub search_weight_keyword: f64,
    /// Default semantic-score weight for weighted-fusion hybrid search.
    pub search_weight_semantic: f64,
}

impl Config {
    /// Load configuration with priority: shell env > `.env` file > built-in defaults.
    pub fn load(project_root: &Path) -> Result<Self, Error> {
        // dotenvy::from_path does NOT override existing env vars, so shell env always wins.
        let _ = dotenvy::from_path(project_root.join(".env"));

        let space_path = PathBuf::from(env_or_default("SPACE_PATH", "/space"));
        let db_path = PathBuf::from(env_or_default("DB_PATH", "/data/ladybug"));
        let grpc_port = parse_env::<u16>("GRPC_PORT", 50051)?;
        let mcp_port = parse_env::<u16>("MCP_PORT", 8000)?;

        let embedding_provider =
            env_or_default("EMBEDDING_PROVIDER", "openai").parse::<EmbeddingProviderType>()?;

        let embedding_model = env_or_default(
            "EMBEDDING_MODEL",
            match embedding_provider {
                EmbeddingProviderType::Local => "BAAI/bge-small-en-v1.5",
                _ => "text-embedding-3-small",
            },
        );

        let embedding_dimensions = parse_env::<usize>("EMBEDDING_DIMENSIONS", 1536)?;
        let embedding_batch_size = parse_env::<usize>("EMBEDDING_BATCH_SIZE", 100)?;
        let enable_embeddings = parse_env_bool("ENABLE_EMBEDDINGS", true)?;
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let ollama_host = env_or_default("OLLAMA_HOST", "http://localhost:11434");
        let embedding_endpoint = std::env::var("EMBEDDING_ENDPOINT").ok();

        let allow_library_management = parse_env_bool("ALLOW_LIBRARY_MANAGEMENT", false)?;

        let ignore_patterns = parse_comma_list_string("IGNORE_PATTERNS", vec![]);
        let watch_enabled = parse_env_bool("WATCH_ENABLED", true)?;
        let watch_debounce_ms = parse_env::<u64>("WATCH_DEBOUNCE_MS", 5000)?;

        let search_default_limit = parse_env::<usize>("SEARCH_DEFAULT_LIMIT", 10)?;
        let search_min_score = parse_env::<f64>("SEARCH_MIN_SCORE", 0.0)?;
        let search_rrf_k = parse_env::<f64>("SEARCH_RRF_K", 60.0)?;
        let search_weight_keyword = parse_env::<f64>("SEARCH_WEIGHT_KEYWORD", 0.5)?;
        let search_weight_semantic = parse_env::<f64>("SEARCH_WEIGHT_SEMANTIC", 0.5)?;

        let config = Self {
            space_path,
            db_path,
            grpc_port,
            mcp_port,
            embedding_provider,
            embedding_model,
            embedding_dimensions,
            embedding_batch_size,
            enable_embeddings,
            openai_api_key,
            ollama_host,
            embedding_endpoint,
            allow_library_management,
            ignore_patterns,
            watch_enabled,
            watch_debounce_ms,
            search_default_limit,
            search_min_score,
            search_rrf_k,
            search_weight_keyword,
            search_weight_semantic,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate constraint invariants on the loaded config.
    fn validate(&self) -> Result<(), Error> {
        if self.embedding_dimensions == 0 {
            return Err(Error::ConfigError("embedding_dimensions must be > 0".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(Error::ConfigError("embedding_batch_size must be > 0".into()));
        }
        if self.search_rrf_k <= 0.0 {
            return Err(Error::ConfigError("search_rrf_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.search_min_score) {
            return Err(Error::ConfigError(format!(
                "search_min_score ({}) must be in [0.0, 1.0]",
                self.search_min_score
            )));
        }
        if !(0.0..=1.0).contains(&self.search_weight_keyword)
            || !(0.0..=1.0).contains(&self.search_weight_semantic)
        {
            return Err(Error::ConfigError(
                "search_weight_keyword and search_weight_semantic must be in [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

/// Read an env var or return a default string value.
fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an env var into a typed value, using a default if not set.
fn parse_env<T>(key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| Error::ConfigError(format!("failed to parse {key}='{val}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a boolean env var (true/false/1/0).
fn parse_env_bool(key: &str, default: bool) -> Result<bool, Error> {
    match std::env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Error::ConfigError(format!(
                "failed to parse {key}='{val}': expected true/false/1/0/yes/no"
            ))),
        },
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated env var into Vec<String>, trimming whitespace.
fn parse_comma_list_string(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.split(',').map(|s| s.trim().to_string()).collect(),
        _ => default,
    }
}
