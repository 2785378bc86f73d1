use serde::{Deserialize, Serialize};

use crate::parser::{self, DataBlock, InlineAttribute, MarkdownFile, Transclusion, WikiLink};

/// A chunk of markdown content produced by splitting a file on `##` headings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier: `"relative/path.md#header"`.
    pub id: String,
    /// Relative path to the source markdown file (as a string, for stable ids).
    pub file_path: String,
    /// Folder path relative to the space root.
    pub folder_path: String,
    /// The `##` heading text this chunk was split on, or the file stem for the
    /// implicit leading chunk when a file has content before its first `##`.
    pub header: String,
    /// 0-based order of this chunk within its file (feeds the `HAS_CHUNK.chunk_order` edge property).
    pub chunk_order: usize,
    /// The chunk's raw text content.
    pub content: String,
    /// Wikilinks found within this chunk's content.
    pub links: Vec<WikiLink>,
    /// Tags found within this chunk's content (frontmatter tags are attached once, to the first chunk).
    pub tags: Vec<String>,
    /// Transclusion directives found within this chunk.
    pub transclusions: Vec<Transclusion>,
    /// Inline attributes found within this chunk.
    pub attributes: Vec<InlineAttribute>,
    /// Fenced data blocks found within this chunk.
    pub data_blocks: Vec<DataBlock>,
}

/// Split a parsed file into chunks at each `##` (h2) heading boundary.
///
/// A file with no `##` headings produces a single chunk whose header is the
/// file's stem. Content appearing before the first `##` heading becomes its
/// own leading chunk using the file stem as its header.
pub fn chunk_document(file: &MarkdownFile) -> Vec<Chunk> {
    let stem = file
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "untitled".to_string());
    let file_path = file.path.to_string_lossy().to_string();

    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
    let mut current_header = stem.clone();
    let mut current_lines: Vec<&str> = Vec::new();

    for line in file.body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("## ") {
            if !current_lines.is_empty() {
                sections.push((current_header.clone(), std::mem::take(&mut current_lines)));
            } else if sections.is_empty() && current_header == stem {
                // No content preceded the first heading; drop the empty leading section.
            }
            current_header = trimmed.trim_start_matches('#').trim().to_string();
        } else {
            current_lines.push(line);
        }
    }
    if !current_lines.iter().all(|l| l.trim().is_empty()) {
        sections.push((current_header, current_lines));
    }

    if sections.is_empty() {
        sections.push((stem, file.body.lines().collect()));
    }

    sections
        .into_iter()
        .enumerate()
        .filter_map(|(idx, (header, lines))| {
            let content = lines.join("\n").trim().to_string();
            if content.is_empty() && idx != 0 {
                return None;
            }
            let mut tags = parser::extract_hashtags(&content);
            if idx == 0 {
                if let Some(fm) = &file.frontmatter {
                    if let Some(raw) = fm.get("tags") {
                        let fm_tags: Vec<String> = match raw {
                            serde_json::Value::String(s) => vec![s.to_lowercase()],
                            serde_json::Value::Array(arr) => arr
                                .iter()
                                .filter_map(|v| v.as_str())
                                .map(|s| s.to_lowercase())
                                .collect(),
                            _ => Vec::new(),
                        };
                        for tag in fm_tags {
                            if !tag.is_empty() && !tags.contains(&tag) {
                                tags.push(tag);
                            }
                        }
                    }
                }
            }
            Some(Chunk {
                id: format!("{file_path}#{header}"),
                file_path: file_path.clone(),
                folder_path: file.folder_path.clone(),
                header: header.clone(),
                chunk_order: idx,
                links: parser::extract_links(&content),
                tags,
                transclusions: parser::extract_transclusions(&content),
                attributes: parser::extract_attributes(&content),
                data_blocks: parser::extract_data_blocks(&content),
                content,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_file(body: &str) -> MarkdownFile {
        MarkdownFile {
            path: PathBuf::from("Notes/Example.md"),
            folder_path: "Notes".to_string(),
            frontmatter: None,
            tags: vec![],
            headings: vec![],
            links: vec![],
            transclusions: vec![],
            attributes: vec![],
            data_blocks: vec![],
            body: body.to_string(),
            content_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn single_chunk_when_no_h2_headings() {
        let file = make_file("# Title\nSome content here.");
        let chunks = chunk_document(&file);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header, "Example");
        assert_eq!(chunks[0].chunk_order, 0);
    }

    #[test]
    fn splits_on_h2_headings() {
        let file = make_file("Intro text.\n## First\ncontent one\n## Second\ncontent two\n");
        let chunks = chunk_document(&file);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].header, "Example");
        assert_eq!(chunks[1].header, "First");
        assert_eq!(chunks[2].header, "Second");
        assert_eq!(chunks[1].chunk_order, 1);
    }

    #[test]
    fn chunk_ids_include_file_path_and_header() {
        let file = make_file("## Only\nbody");
        let chunks = chunk_document(&file);
        assert_eq!(chunks[0].id, "Notes/Example.md#Only");
    }

    #[test]
    fn per_chunk_tags_and_links_extracted() {
        let file = make_file("## Section\nSee [[Other Page]] about #rust.");
        let chunks = chunk_document(&file);
        assert_eq!(chunks[0].links.len(), 1);
        assert_eq!(chunks[0].tags, vec!["rust".to_string()]);
    }

    #[test]
    fn frontmatter_tags_attach_to_first_chunk_only() {
        let mut file = make_file("Intro\n## Section\nbody");
        file.frontmatter = Some(serde_json::json!({"tags": ["project"]}));
        let chunks = chunk_document(&file);
        assert!(chunks[0].tags.contains(&"project".to_string()));
        assert!(!chunks[1].tags.contains(&"project".to_string()));
    }

    #[test]
    fn empty_body_produces_single_empty_chunk() {
        let file = make_file("");
        let chunks = chunk_document(&file);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
    }
}
