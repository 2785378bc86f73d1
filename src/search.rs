use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::embedding::clean::embed_batch_with_cleaning;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::graph::{page_name_for_file, ChunkNode, GraphStore};

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;
const TAG_BOOST: f64 = 2.0;
const HEADER_WEIGHT: f64 = 2.0;
const FILE_PATH_WEIGHT: f64 = 1.5;
const TECHNICAL_TERM_BOOST: f64 = 1.5;
const MAX_RESULTS: usize = 50;

/// Domain terms whose matches get a modest score boost, mirroring how a
/// keyword search over technical notes should weight jargon more than prose.
const TECHNICAL_TERMS: &[&str] = &[
    "sql", "nosql", "api", "rest", "graphql", "json", "xml", "index", "indexes", "query",
    "queries", "schema", "migration", "optimization", "performance", "cache", "caching", "async",
    "database", "db", "repository", "orm", "transaction",
];

/// A scored chunk returned from any search mode.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub file_path: String,
    pub header: String,
    pub content: String,
    pub score: f64,
}

/// Optional filters applied during scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict results to chunks tagged with all of these tags.
    pub tags: Vec<String>,
    /// Restrict results to a page name.
    pub page: Option<String>,
    /// Restrict results to a folder path (and its subfolders).
    pub scope: Option<String>,
}

/// How a hybrid search combines keyword and semantic rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// Reciprocal rank fusion.
    Rrf,
    /// Weighted linear combination of normalized scores.
    Weighted,
}

/// Keyword (BM25) search over chunk content, file path and header.
///
/// Multi-term queries are OR'd: each term contributes its own BM25 score and
/// the contributions are summed. A term found among the chunk's tags gets a
/// [`TAG_BOOST`] multiplier; terms drawn from [`TECHNICAL_TERMS`] additionally
/// get a [`TECHNICAL_TERM_BOOST`] multiplier. Document frequency is computed
/// by substring containment, matching how notes are actually searched rather
/// than exact tokenization.
pub fn keyword_search(store: &GraphStore, query: &str, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Err(Error::invalid_argument("query must contain at least one term"));
    }

    let chunks = scoped_chunks(store, filter);
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let total_docs = chunks.len() as f64;
    let avg_doc_length: f64 =
        chunks.iter().map(|c| c.content.len() as f64).sum::<f64>() / total_docs;

    let mut hits = Vec::new();
    for chunk in &chunks {
        let tags = store.tags_for_chunk(&chunk.id);
        let haystack_content = chunk.content.to_lowercase();
        let haystack_path = chunk.file_path.to_lowercase();
        let haystack_header = chunk.header.to_lowercase();
        let doc_length = chunk.content.len() as f64;

        let mut score = 0.0;
        for term in &terms {
            let mut tf = haystack_content.matches(term.as_str()).count() as f64
                + haystack_path.matches(term.as_str()).count() as f64 * FILE_PATH_WEIGHT
                + haystack_header.matches(term.as_str()).count() as f64 * HEADER_WEIGHT;
            if tf == 0.0 {
                continue;
            }
            if tags.iter().any(|t| t == term) {
                tf *= TAG_BOOST;
            }
            if TECHNICAL_TERMS.contains(&term.as_str()) {
                tf *= TECHNICAL_TERM_BOOST;
            }

            let df = chunks
                .iter()
                .filter(|c| {
                    c.content.to_lowercase().contains(term.as_str())
                        || c.file_path.to_lowercase().contains(term.as_str())
                        || c.header.to_lowercase().contains(term.as_str())
                })
                .count() as f64;
            let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
            let normalized_tf = (tf * (BM25_K1 + 1.0))
                / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_length / avg_doc_length));

            score += idf * normalized_tf;
        }

        if score > 0.0 {
            hits.push(SearchHit {
                chunk_id: chunk.id.clone(),
                file_path: chunk.file_path.clone(),
                header: chunk.header.clone(),
                content: chunk.content.clone(),
                score: round4(score),
            });
        }
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    hits.truncate(MAX_RESULTS);
    Ok(hits)
}

/// Semantic (vector similarity) search, restricted to the same scope/tag/page
/// filters as [`keyword_search`] for apples-to-apples hybrid fusion.
pub fn semantic_search(
    store: &GraphStore,
    query_vector: &[f32],
    limit: usize,
    filter: &SearchFilter,
) -> Result<Vec<SearchHit>> {
    let allowed: Option<HashSet<String>> = if has_filter(filter) {
        Some(scoped_chunks(store, filter).into_iter().map(|c| c.id).collect())
    } else {
        None
    };

    // Over-fetch so post-filtering still leaves `limit` results when possible.
    let fetch = (limit * 4).max(limit).min(MAX_RESULTS * 4);
    let matches = store.vector_search(query_vector, fetch)?;

    let mut hits = Vec::new();
    for (chunk_id, score) in matches {
        if let Some(ref allowed) = allowed {
            if !allowed.contains(&chunk_id) {
                continue;
            }
        }
        let Some(chunk) = store.chunk(&chunk_id) else { continue };
        hits.push(SearchHit {
            chunk_id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            header: chunk.header.clone(),
            content: chunk.content.clone(),
            score: round4(score as f64),
        });
        if hits.len() >= limit {
            break;
        }
    }
    Ok(hits)
}

/// Fuse keyword and semantic result lists into one ranking.
///
/// `rrf_k` is the reciprocal-rank-fusion constant (`score = sum(1/(k+rank))`,
/// min-max normalized to `[0, 1]`); `weight_keyword`/`weight_semantic` are
/// used only in [`FusionMode::Weighted`], where the semantic contribution
/// decays with rank as `exp(-0.1 * rank)` and the keyword contribution is its
/// min-max normalized BM25 score.
pub fn hybrid_search(
    keyword_hits: &[SearchHit],
    semantic_hits: &[SearchHit],
    mode: FusionMode,
    rrf_k: f64,
    weight_keyword: f64,
    weight_semantic: f64,
) -> Vec<SearchHit> {
    match mode {
        FusionMode::Rrf => fuse_rrf(keyword_hits, semantic_hits, rrf_k),
        FusionMode::Weighted => fuse_weighted(keyword_hits, semantic_hits, weight_keyword, weight_semantic),
    }
}

fn fuse_rrf(keyword_hits: &[SearchHit], semantic_hits: &[SearchHit], k: f64) -> Vec<SearchHit> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut by_id: HashMap<String, &SearchHit> = HashMap::new();

    for (rank, hit) in keyword_hits.iter().enumerate() {
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        by_id.entry(hit.chunk_id.clone()).or_insert(hit);
    }
    for (rank, hit) in semantic_hits.iter().enumerate() {
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        by_id.entry(hit.chunk_id.clone()).or_insert(hit);
    }

    normalize_and_sort(scores, &by_id)
}

fn fuse_weighted(
    keyword_hits: &[SearchHit],
    semantic_hits: &[SearchHit],
    weight_keyword: f64,
    weight_semantic: f64,
) -> Vec<SearchHit> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut by_id: HashMap<String, &SearchHit> = HashMap::new();

    let max_kw = keyword_hits.iter().map(|h| h.score).fold(0.0, f64::max);
    for hit in keyword_hits {
        let normalized = if max_kw > 0.0 { hit.score / max_kw } else { 0.0 };
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += weight_keyword * normalized;
        by_id.entry(hit.chunk_id.clone()).or_insert(hit);
    }
    for (rank, hit) in semantic_hits.iter().enumerate() {
        let decayed = (-0.1 * rank as f64).exp();
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += weight_semantic * decayed;
        by_id.entry(hit.chunk_id.clone()).or_insert(hit);
    }

    normalize_and_sort(scores, &by_id)
}

fn normalize_and_sort(scores: HashMap<String, f64>, by_id: &HashMap<String, &SearchHit>) -> Vec<SearchHit> {
    let min = scores.values().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let mut hits: Vec<SearchHit> = scores
        .into_iter()
        .filter_map(|(id, score)| {
            let hit = by_id.get(&id)?;
            let normalized = if range > 0.0 { (score - min) / range } else { 1.0 };
            Some(SearchHit {
                chunk_id: hit.chunk_id.clone(),
                file_path: hit.file_path.clone(),
                header: hit.header.clone(),
                content: hit.content.clone(),
                score: round4(normalized),
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    hits
}

/// Full hybrid-search orchestration: rejects an empty query, normalizes
/// weighted-fusion weights that don't sum to 1 (within 0.01), always runs
/// keyword search, and — when embeddings are enabled — embeds the query and
/// runs vector search too. A query-embedding or vector-search failure is
/// logged and the search degrades to keyword-only rather than failing.
pub async fn search(
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    embeddings_enabled: bool,
    query: &str,
    limit: usize,
    filter: &SearchFilter,
    mode: FusionMode,
    rrf_k: f64,
    weight_keyword: f64,
    weight_semantic: f64,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Err(Error::invalid_argument("query must not be empty"));
    }

    let (weight_keyword, weight_semantic) = if mode == FusionMode::Weighted {
        normalize_weights(weight_keyword, weight_semantic)
    } else {
        (weight_keyword, weight_semantic)
    };

    let keyword_hits = keyword_search(store, query, filter)?;

    let semantic_hits = if embeddings_enabled {
        match embed_query(provider, query).await {
            Ok(vector) => match semantic_search(store, &vector, limit * 2, filter) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "vector search failed, degrading to keyword-only search");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "query embedding failed, degrading to keyword-only search");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let mut fused = if semantic_hits.is_empty() {
        keyword_hits
    } else if keyword_hits.is_empty() {
        semantic_hits
    } else {
        hybrid_search(&keyword_hits, &semantic_hits, mode, rrf_k, weight_keyword, weight_semantic)
    };
    fused.truncate(limit);
    Ok(fused)
}

/// Embed a single query string through the same cleaning contract used for
/// indexing, so a query and the chunks it's compared against see the same
/// normalization.
pub async fn embed_query(provider: &dyn EmbeddingProvider, query: &str) -> Result<Vec<f32>> {
    let (vectors, _) = embed_batch_with_cleaning(provider, &[query.to_string()]).await?;
    Ok(vectors.into_iter().next().unwrap_or_default())
}

fn normalize_weights(weight_keyword: f64, weight_semantic: f64) -> (f64, f64) {
    let sum = weight_keyword + weight_semantic;
    if sum > 0.0 && (sum - 1.0).abs() > 0.01 {
        (weight_keyword / sum, weight_semantic / sum)
    } else {
        (weight_keyword, weight_semantic)
    }
}

fn has_filter(filter: &SearchFilter) -> bool {
    !filter.tags.is_empty() || filter.page.is_some() || filter.scope.is_some()
}

fn scoped_chunks(store: &GraphStore, filter: &SearchFilter) -> Vec<ChunkNode> {
    let scope_ids: Option<HashSet<String>> =
        filter.scope.as_ref().map(|scope| store.chunks_in_scope(scope).into_iter().collect());

    store
        .all_chunks()
        .into_iter()
        .filter(|c| {
            if let Some(ref page) = filter.page {
                if &page_name_for_file(&c.file_path) != page {
                    return false;
                }
            }
            if let Some(ref ids) = scope_ids {
                if !ids.contains(&c.id) {
                    return false;
                }
            }
            if !filter.tags.is_empty() {
                let tags = store.tags_for_chunk(&c.id);
                if !filter.tags.iter().all(|t| tags.contains(t)) {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}
