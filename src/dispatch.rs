//! Typed request/response handlers behind the RPC/tool-server boundary.
//!
//! Each function here is the core-facing half of one wire operation: it
//! takes a plain Rust request struct, performs exactly one graph/parser/
//! filesystem operation, and returns a plain Rust response struct with a
//! `success`/`error` pair mirroring the wire shape. Binding these to an
//! actual gRPC service or HTTP tool route is left to the excluded transport
//! layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::search::{self, FusionMode, SearchFilter, SearchHit};

fn results_json(hits: &[SearchHit]) -> Result<String> {
    serde_json::to_string(hits).map_err(|e| Error::Serialization(e.to_string()))
}

/// Resolve `page_name` to its relative file path and assert the result is a
/// descendant of `space_path`. Every handler that accepts a path-like
/// argument runs it through this gate before touching the filesystem.
fn resolve_under_space(space_path: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = space_path.join(relative);
    let space_abs = space_path
        .canonicalize()
        .unwrap_or_else(|_| space_path.to_path_buf());

    // The file may not exist yet (e.g. a folder index page); canonicalize
    // what does exist and check the rest lexically against it.
    let mut check = candidate.clone();
    while !check.exists() {
        match check.parent() {
            Some(parent) => check = parent.to_path_buf(),
            None => break,
        }
    }
    let check_abs = check.canonicalize().unwrap_or(check);
    if !check_abs.starts_with(&space_abs) {
        return Err(Error::invalid_argument("Invalid page name"));
    }
    Ok(candidate)
}

/// `Query` RPC: opaque cypher passthrough.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub cypher_query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results_json: String,
    pub success: bool,
    pub error: Option<String>,
}

pub fn query(store: &GraphStore, req: QueryRequest) -> QueryResponse {
    match store.cypher(&req.cypher_query) {
        Ok(rows) => QueryResponse {
            results_json: serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()),
            success: true,
            error: None,
        },
        Err(e) => QueryResponse {
            results_json: "[]".to_string(),
            success: false,
            error: Some(e.to_string()),
        },
    }
}

/// `Search` RPC: keyword (BM25) search.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results_json: String,
    pub success: bool,
    pub error: Option<String>,
}

pub fn keyword_search(store: &GraphStore, req: SearchRequest) -> SearchResponse {
    let limit = req.limit.filter(|l| *l > 0).unwrap_or(10);
    match search::keyword_search(store, &req.keyword, &SearchFilter::default()) {
        Ok(mut hits) => {
            hits.truncate(limit);
            match results_json(&hits) {
                Ok(json) => SearchResponse { results_json: json, success: true, error: None },
                Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
            }
        }
        Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
    }
}

/// `SemanticSearch` RPC. The wire request carries query text, not a vector —
/// the query is embedded here via the configured provider.
#[derive(Debug, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub filter_tags: Option<Vec<String>>,
    pub filter_pages: Option<Vec<String>>,
}

pub async fn semantic_search(
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    req: SemanticSearchRequest,
) -> SearchResponse {
    let limit = req.limit.filter(|l| *l > 0).unwrap_or(10);
    let filter = SearchFilter {
        tags: req.filter_tags.unwrap_or_default(),
        page: req.filter_pages.and_then(|p| p.into_iter().next()),
        scope: None,
    };

    let vector = match search::embed_query(provider, &req.query).await {
        Ok(v) => v,
        Err(e) => return SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
    };

    match search::semantic_search(store, &vector, limit, &filter) {
        Ok(hits) => match results_json(&hits) {
            Ok(json) => SearchResponse { results_json: json, success: true, error: None },
            Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
        },
        Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
    }
}

/// `HybridSearch` RPC. Embeds `query` internally and degrades to
/// keyword-only (rather than erroring) if that embedding call fails.
#[derive(Debug, Deserialize)]
pub struct HybridSearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub filter_tags: Option<Vec<String>>,
    pub filter_pages: Option<Vec<String>>,
    pub fusion_method: Option<String>,
    pub semantic_weight: Option<f64>,
    pub keyword_weight: Option<f64>,
}

pub async fn hybrid_search(
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    config: &Config,
    req: HybridSearchRequest,
) -> SearchResponse {
    let limit = req.limit.filter(|l| *l > 0).unwrap_or(10);
    let mode = match req.fusion_method.as_deref() {
        Some("weighted") => FusionMode::Weighted,
        _ => FusionMode::Rrf,
    };
    let filter = SearchFilter {
        tags: req.filter_tags.unwrap_or_default(),
        page: req.filter_pages.and_then(|p| p.into_iter().next()),
        scope: None,
    };
    let weight_keyword = req.keyword_weight.unwrap_or(config.search_weight_keyword);
    let weight_semantic = req.semantic_weight.unwrap_or(config.search_weight_semantic);

    let result = search::search(
        store,
        provider,
        config.enable_embeddings,
        &req.query,
        limit,
        &filter,
        mode,
        config.search_rrf_k,
        weight_keyword,
        weight_semantic,
    )
    .await;

    match result {
        Ok(hits) => match results_json(&hits) {
            Ok(json) => SearchResponse { results_json: json, success: true, error: None },
            Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
        },
        Err(e) => SearchResponse { results_json: "[]".into(), success: false, error: Some(e.to_string()) },
    }
}

/// `ReadPage` RPC.
#[derive(Debug, Deserialize)]
pub struct ReadPageRequest {
    pub page_name: String,
}

#[derive(Debug, Serialize)]
pub struct ReadPageResponse {
    pub content: String,
    pub success: bool,
    pub error: Option<String>,
}

pub fn read_page(store: &GraphStore, config: &Config, req: ReadPageRequest) -> ReadPageResponse {
    if resolve_under_space(&config.space_path, &format!("{}.md", req.page_name)).is_err() {
        return ReadPageResponse {
            content: String::new(),
            success: false,
            error: Some("Invalid page name".to_string()),
        };
    }

    match store.read_page(&req.page_name) {
        Some(chunks) => {
            let content = chunks
                .iter()
                .map(|c| format!("## {}\n{}", c.header, c.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            ReadPageResponse { content, success: true, error: None }
        }
        None => ReadPageResponse {
            content: String::new(),
            success: false,
            error: Some(format!("not found: page {}", req.page_name)),
        },
    }
}

/// `GetFolderContext` RPC.
///
/// The sibling-index convention means folder `X`'s page is `X.md`, never
/// `X/index.md`; `page_name` is that sibling's stem.
#[derive(Debug, Deserialize)]
pub struct GetFolderContextRequest {
    pub folder_path: String,
}

#[derive(Debug, Serialize)]
pub struct GetFolderContextResponse {
    pub found: bool,
    pub page_name: Option<String>,
    pub page_content: Option<String>,
    pub folder_scope: String,
    pub success: bool,
    pub error: Option<String>,
}

pub fn get_folder_context(store: &GraphStore, config: &Config, req: GetFolderContextRequest) -> GetFolderContextResponse {
    let page_name = crate::graph::page_name_for_file(&format!("{}.md", req.folder_path));

    if resolve_under_space(&config.space_path, &format!("{}.md", req.folder_path)).is_err() {
        return GetFolderContextResponse {
            found: false,
            page_name: None,
            page_content: None,
            folder_scope: req.folder_path,
            success: false,
            error: Some("Invalid page name".to_string()),
        };
    }

    match store.read_page(&page_name) {
        Some(chunks) => {
            let content = chunks
                .iter()
                .map(|c| format!("## {}\n{}", c.header, c.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            GetFolderContextResponse {
                found: true,
                page_name: Some(page_name),
                page_content: Some(content),
                folder_scope: req.folder_path,
                success: true,
                error: None,
            }
        }
        None => GetFolderContextResponse {
            found: false,
            page_name: None,
            page_content: None,
            folder_scope: req.folder_path,
            success: true,
            error: None,
        },
    }
}

/// `GetProjectContext` RPC: find a project's index page by github remote or
/// by folder path, and return it plus its sibling pages.
#[derive(Debug, Deserialize)]
pub struct GetProjectContextRequest {
    pub github_remote: Option<String>,
    pub folder_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectContext {
    pub file: String,
    pub github: Option<String>,
    pub tags: Vec<String>,
    pub concerns: Vec<String>,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RelatedPage {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct GetProjectContextResponse {
    pub project: Option<ProjectContext>,
    pub related_pages: Vec<RelatedPage>,
    pub success: bool,
    pub error: Option<String>,
}

const MAX_RELATED_PAGES: usize = 20;

pub fn get_project_context(store: &GraphStore, req: GetProjectContextRequest) -> GetProjectContextResponse {
    if req.github_remote.is_none() && req.folder_path.is_none() {
        return GetProjectContextResponse {
            project: None,
            related_pages: vec![],
            success: false,
            error: Some("Must provide either github_remote or folder_path".to_string()),
        };
    }

    let mut found: Option<(String, crate::graph::ChunkNode)> = None;

    if let Some(ref remote) = req.github_remote {
        for chunk in store.all_chunks() {
            if chunk.chunk_order != 0 {
                continue;
            }
            let frontmatter: Value = serde_json::from_str(&chunk.frontmatter).unwrap_or(Value::Null);
            if frontmatter.get("github").and_then(Value::as_str) == Some(remote.as_str()) {
                found = Some((chunk.file_path.clone(), chunk));
                break;
            }
        }
    } else if let Some(ref folder_path) = req.folder_path {
        let index_file = format!("{folder_path}.md");
        if let Some(chunks) = store.read_page(&crate::graph::page_name_for_file(&index_file)) {
            if let Some(first) = chunks.into_iter().next() {
                found = Some((index_file, first));
            }
        }
    }

    let Some((file_path, chunk)) = found else {
        return GetProjectContextResponse {
            project: None,
            related_pages: vec![],
            success: false,
            error: Some(format!(
                "No project found for github_remote={:?}, folder_path={:?}",
                req.github_remote, req.folder_path
            )),
        };
    };

    let frontmatter: Value = serde_json::from_str(&chunk.frontmatter).unwrap_or(Value::Null);
    let tags: Vec<String> = frontmatter
        .get("tags")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let concerns: Vec<String> = frontmatter
        .get("concerns")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let github = frontmatter.get("github").and_then(Value::as_str).map(str::to_string);

    let page_name = crate::graph::page_name_for_file(&file_path);
    let content = store
        .read_page(&page_name)
        .map(|chunks| {
            chunks
                .iter()
                .map(|c| format!("## {}\n{}", c.header, c.content))
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default();

    let folder = Path::new(&file_path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();

    let mut related_pages = Vec::new();
    if !folder.is_empty() {
        for other in store.all_chunks() {
            if other.chunk_order != 0 || other.file_path == file_path {
                continue;
            }
            let other_folder = Path::new(&other.file_path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
            if other_folder == folder {
                related_pages.push(RelatedPage {
                    name: crate::graph::page_name_for_file(&other.file_path),
                    path: other.file_path.clone(),
                });
            }
        }
    }
    related_pages.truncate(MAX_RELATED_PAGES);

    GetProjectContextResponse {
        project: Some(ProjectContext {
            file: file_path,
            github,
            tags,
            concerns,
            content,
        }),
        related_pages,
        success: true,
        error: None,
    }
}
