use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Cycles and runaway chains are broken after this many nested expansions.
const MAX_TRANSCLUSION_DEPTH: usize = 5;

/// A wikilink extracted from a chunk's body: `[[Target]]` or `[[Target|Alias]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiLink {
    pub target: String,
    pub alias: Option<String>,
}

/// A transclusion directive: `![[Target]]` or `![[Target#Header]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transclusion {
    pub target_page: String,
    pub target_header: Option<String>,
}

/// An inline attribute: `[name: value]`, not a markdown link and not a transclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineAttribute {
    pub name: String,
    pub value: String,
}

/// A fenced data block: ```` ```#tag\n<yaml>\n``` ````.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBlock {
    pub tag: String,
    pub data: serde_json::Value,
}

/// A heading extracted from a markdown document.
#[derive(Debug, Clone, Serialize)]
pub struct Heading {
    /// Heading level (1-6).
    pub level: u8,
    /// The text content of the heading.
    pub text: String,
    /// 1-based line number where the heading appears.
    pub line_number: usize,
}

/// A parsed markdown file with extracted metadata.
#[derive(Debug, Clone, Serialize)]
pub struct MarkdownFile {
    /// Relative path to the markdown file.
    pub path: PathBuf,
    /// Folder path relative to the space root (empty string for root-level files).
    pub folder_path: String,
    /// YAML frontmatter parsed as dynamic JSON value, if present.
    pub frontmatter: Option<serde_json::Value>,
    /// Tags merged from frontmatter `tags:` and body hashtags (content tags first, deduped).
    pub tags: Vec<String>,
    /// Headings extracted from the document.
    pub headings: Vec<Heading>,
    /// Wikilinks found anywhere in the body.
    pub links: Vec<WikiLink>,
    /// Transclusion directives found in the body.
    pub transclusions: Vec<Transclusion>,
    /// Inline attributes found in the body.
    pub attributes: Vec<InlineAttribute>,
    /// Fenced data blocks found in the body.
    pub data_blocks: Vec<DataBlock>,
    /// Raw body content (everything after frontmatter).
    pub body: String,
    /// SHA-256 hex digest of the full file content, used as the watcher's change-detection hash.
    pub content_hash: String,
}

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---\s*\n").unwrap())
}

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap())
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[^`\w/])#([A-Za-z][A-Za-z0-9_-]*)").unwrap())
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([A-Za-z_][A-Za-z0-9_]*):\s*([^\]]+)\](\()?").unwrap())
}

fn data_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```#([A-Za-z0-9_-]+)\n(.*?)\n```").unwrap())
}

fn transclusion_directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[\[([^\]]+)\]\]").unwrap())
}

/// Compute a SHA-256 hex digest of the given content.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract YAML frontmatter and the remaining body from raw file content.
fn split_frontmatter(content: &str) -> (Option<serde_json::Value>, String) {
    match frontmatter_re().captures(content) {
        Some(caps) => {
            let yaml_text = caps.get(1).unwrap().as_str();
            let body = frontmatter_re().replace(content, "").into_owned();
            let frontmatter = serde_yaml::from_str::<serde_yaml::Value>(yaml_text)
                .ok()
                .and_then(|v| serde_json::to_value(v).ok());
            (frontmatter, body)
        }
        None => (None, content.to_string()),
    }
}

/// Extract wikilinks (excluding transclusion `![[...]]` markers) from body text.
pub(crate) fn extract_links(body: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    for caps in wikilink_re().captures_iter(body) {
        let whole = caps.get(0).unwrap();
        // Skip transclusions: `![[...]]`.
        if whole.start() > 0 && body.as_bytes()[whole.start() - 1] == b'!' {
            continue;
        }
        let inner = caps.get(1).unwrap().as_str();
        if inner.contains('#') && !inner.contains('|') {
            // `[[Target#Header]]` without an alias is treated as a plain link to Target.
            let target = inner.split('#').next().unwrap_or(inner).to_string();
            links.push(WikiLink { target, alias: None });
            continue;
        }
        let mut parts = inner.splitn(2, '|');
        let target = parts.next().unwrap_or(inner).trim().to_string();
        let alias = parts.next().map(|a| a.trim().to_string());
        links.push(WikiLink { target, alias });
    }
    links
}

/// Extract transclusion directives `![[Target]]` / `![[Target#Header]]`.
pub(crate) fn extract_transclusions(body: &str) -> Vec<Transclusion> {
    let mut out = Vec::new();
    for caps in wikilink_re().captures_iter(body) {
        let whole = caps.get(0).unwrap();
        if whole.start() == 0 || body.as_bytes()[whole.start() - 1] != b'!' {
            continue;
        }
        let inner = caps.get(1).unwrap().as_str();
        let mut parts = inner.splitn(2, '#');
        let target_page = parts.next().unwrap_or(inner).trim().to_string();
        let target_header = parts.next().map(|h| h.trim().to_string());
        out.push(Transclusion {
            target_page,
            target_header,
        });
    }
    out
}

/// Extract `#hashtag` occurrences from body text, lowercased.
pub(crate) fn extract_hashtags(body: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for caps in hashtag_re().captures_iter(body) {
        let tag = caps.get(2).unwrap().as_str().to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Extract inline attributes `[name: value]`, rejecting markdown links and wikilink interiors.
pub(crate) fn extract_attributes(body: &str) -> Vec<InlineAttribute> {
    let mut attrs = Vec::new();
    for caps in attribute_re().captures_iter(body) {
        let whole = caps.get(0).unwrap();
        // `[text](url)` is a markdown link, not an attribute.
        if caps.get(3).is_some() {
            continue;
        }
        // Preceded by `!` means it's a transclusion-adjacent construct; preceded by `[`
        // means it's the interior of a wikilink/transclusion — skip both.
        if whole.start() > 0 {
            let prev = body.as_bytes()[whole.start() - 1];
            if prev == b'!' || prev == b'[' {
                continue;
            }
        }
        let name = caps.get(1).unwrap().as_str().to_string();
        let value = caps.get(2).unwrap().as_str().trim().to_string();
        attrs.push(InlineAttribute { name, value });
    }
    attrs
}

/// Extract fenced ```` ```#tag ```` data blocks with a YAML body.
pub(crate) fn extract_data_blocks(body: &str) -> Vec<DataBlock> {
    let mut blocks = Vec::new();
    for caps in data_block_re().captures_iter(body) {
        let tag = caps.get(1).unwrap().as_str().to_string();
        let yaml_text = caps.get(2).unwrap().as_str();
        let data = serde_yaml::from_str::<serde_yaml::Value>(yaml_text)
            .ok()
            .and_then(|v| serde_json::to_value(v).ok())
            .unwrap_or(serde_json::Value::Null);
        blocks.push(DataBlock { tag, data });
    }
    blocks
}

/// Extract `## ` headings (and all other levels) with line numbers.
pub(crate) fn extract_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level == 0 || level > 6 {
            continue;
        }
        let rest = trimmed[level..].trim();
        if rest.is_empty() && trimmed.len() == level {
            continue;
        }
        if !trimmed[level..].starts_with(' ') && !trimmed[level..].is_empty() {
            continue;
        }
        headings.push(Heading {
            level: level as u8,
            text: rest.to_string(),
            line_number: idx + 1,
        });
    }
    headings
}

fn merge_tags(content_tags: Vec<String>, frontmatter: &Option<serde_json::Value>) -> Vec<String> {
    let mut all = content_tags;
    if let Some(fm) = frontmatter {
        if let Some(raw_tags) = fm.get("tags") {
            let fm_tags: Vec<String> = match raw_tags {
                serde_json::Value::String(s) => vec![s.to_lowercase()],
                serde_json::Value::Array(arr) => arr
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_lowercase())
                    .collect(),
                _ => Vec::new(),
            };
            for tag in fm_tags {
                if !tag.is_empty() && !all.contains(&tag) {
                    all.push(tag);
                }
            }
        }
    }
    all
}

/// Exclusion rules: `.proposal` suffix, `.rejected.md` suffix, a `_Proposals` path segment,
/// or any hidden directory component.
pub fn is_excluded(relative_path: &Path) -> bool {
    let file_name = relative_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if file_name.ends_with(".proposal") || file_name.ends_with(".proposal.md") {
        return true;
    }
    if file_name.ends_with(".rejected.md") {
        return true;
    }
    for component in relative_path.components() {
        let s = component.as_os_str().to_string_lossy();
        if s == "_Proposals" {
            return true;
        }
        if s.starts_with('.') && s != "." && s != ".." {
            return true;
        }
    }
    false
}

/// Parse a single markdown file relative to `project_root` into a [`MarkdownFile`].
///
/// All metadata (links, tags, transclusion directives, attributes, data blocks) is
/// extracted from the raw post-frontmatter body. When `expand_transclusions` is set,
/// the returned `body` additionally has every `![[page]]` / `![[page#header]]`
/// directive replaced by the target page's content, recursively, before chunking.
pub fn parse_markdown_file(
    project_root: &Path,
    relative_path: &Path,
    expand_transclusions: bool,
) -> Result<MarkdownFile> {
    let full_path = project_root.join(relative_path);
    let raw = std::fs::read_to_string(&full_path)
        .map_err(|e| Error::parse(relative_path, e.to_string()))?;

    let content_hash = compute_content_hash(&raw);
    let (frontmatter, raw_body) = split_frontmatter(&raw);

    let folder_path = relative_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();

    let content_tags = extract_hashtags(&raw_body);
    let tags = merge_tags(content_tags, &frontmatter);
    let headings = extract_headings(&raw_body);
    let links = extract_links(&raw_body);
    let transclusions = extract_transclusions(&raw_body);
    let attributes = extract_attributes(&raw_body);
    let data_blocks = extract_data_blocks(&raw_body);

    let body = if expand_transclusions {
        let mut cache = HashMap::new();
        expand_transclusions_in(project_root, &raw_body, &mut cache, 0)
    } else {
        raw_body
    };

    Ok(MarkdownFile {
        path: relative_path.to_path_buf(),
        folder_path,
        frontmatter,
        tags,
        headings,
        links,
        transclusions,
        attributes,
        data_blocks,
        body,
        content_hash,
    })
}

/// Replace every `![[page]]` / `![[page#header]]` directive in `body` with the
/// target page's (post-frontmatter, possibly itself expanded) content. `cache` maps
/// a page name to its resolved body and is shared across the whole recursion, so a
/// page transcluded from several places is only read from disk once.
fn expand_transclusions_in(
    project_root: &Path,
    body: &str,
    cache: &mut HashMap<String, Option<String>>,
    depth: usize,
) -> String {
    if depth >= MAX_TRANSCLUSION_DEPTH {
        return body.to_string();
    }

    transclusion_directive_re()
        .replace_all(body, |caps: &regex::Captures| {
            let inner = caps.get(1).unwrap().as_str();
            let mut parts = inner.splitn(2, '#');
            let target_page = parts.next().unwrap_or(inner).trim().to_string();
            let target_header = parts.next().map(|h| h.trim().to_string());

            let Some(page_body) = resolve_page_body(project_root, &target_page, cache) else {
                return caps.get(0).unwrap().as_str().to_string();
            };

            let section = match &target_header {
                Some(header) => match extract_subsection(&page_body, header) {
                    Some(section) => section,
                    None => return caps.get(0).unwrap().as_str().to_string(),
                },
                None => page_body,
            };

            expand_transclusions_in(project_root, &section, cache, depth + 1)
        })
        .into_owned()
}

/// Look up (and cache) a page's post-frontmatter body by page name.
fn resolve_page_body(
    project_root: &Path,
    page_name: &str,
    cache: &mut HashMap<String, Option<String>>,
) -> Option<String> {
    if let Some(cached) = cache.get(page_name) {
        return cached.clone();
    }

    let resolved = find_page_path(project_root, page_name).and_then(|path| {
        std::fs::read_to_string(&path)
            .ok()
            .map(|raw| split_frontmatter(&raw).1)
    });
    cache.insert(page_name.to_string(), resolved.clone());
    resolved
}

/// Find the markdown file under `project_root` whose stem matches `page_name`,
/// mirroring [`crate::graph::page_name_for_file`]'s resolution by file stem.
fn find_page_path(project_root: &Path, page_name: &str) -> Option<PathBuf> {
    fn walk(dir: &Path, project_root: &Path, page_name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(project_root) else {
                continue;
            };
            if is_excluded(relative) {
                continue;
            }
            if path.is_dir() {
                if let Some(found) = walk(&path, project_root, page_name) {
                    return Some(found);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("md")
                && path.file_stem().and_then(|s| s.to_str()) == Some(page_name)
            {
                return Some(path);
            }
        }
        None
    }
    walk(project_root, project_root, page_name)
}

/// Extract the subsection of `body` starting at the first heading whose text
/// matches `header` case-insensitively, up to (but excluding) the next heading at
/// an equal or shallower level. Returns `None` if no heading matches.
fn extract_subsection(body: &str, header: &str) -> Option<String> {
    let lines: Vec<&str> = body.lines().collect();
    let header_lower = header.to_lowercase();

    let mut start = None;
    let mut start_level = 0u8;
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level == 0 || level > 6 || !trimmed[level..].starts_with(' ') {
            continue;
        }
        let text = trimmed[level..].trim();
        if text.to_lowercase() == header_lower {
            start = Some(idx);
            start_level = level as u8;
            break;
        }
    }
    let start = start?;

    let mut end = lines.len();
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level > 0 && level <= 6 && trimmed[level..].starts_with(' ') && level as u8 <= start_level {
            end = idx;
            break;
        }
    }

    Some(lines[start + 1..end].join("\n").trim().to_string())
}

/// Every directory reached while walking `root`, slash-joined relative paths.
pub fn get_folder_paths(root: &Path) -> Vec<String> {
    walk_folders(root).0
}

/// Folders whose sibling `<Folder>.md` exists (the Silverbullet folder-index
/// convention — `Folder/index.md` is not recognized), mapped to that markdown
/// file's path relative to `root`.
pub fn get_folder_index_pages(root: &Path) -> HashMap<String, String> {
    walk_folders(root).1
}

fn walk_folders(root: &Path) -> (Vec<String>, HashMap<String, String>) {
    let mut folders = BTreeSet::new();
    let mut index_pages = HashMap::new();
    collect_folders(root, root, &mut folders, &mut index_pages);
    (folders.into_iter().collect(), index_pages)
}

fn collect_folders(
    dir: &Path,
    root: &Path,
    folders: &mut BTreeSet<String>,
    index_pages: &mut HashMap<String, String>,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if is_excluded(relative) || !path.is_dir() {
            continue;
        }

        let folder_path = relative.to_string_lossy().replace('\\', "/");
        folders.insert(folder_path.clone());

        if let Some(name) = path.file_name() {
            let sibling = dir.join(format!("{}.md", name.to_string_lossy()));
            if sibling.is_file() {
                if let Ok(sibling_relative) = sibling.strip_prefix(root) {
                    index_pages.insert(folder_path.clone(), sibling_relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        collect_folders(&path, root, folders, index_pages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(compute_content_hash("hello world"), compute_content_hash("hello world"));
    }

    #[test]
    fn content_hash_content_sensitive() {
        assert_ne!(compute_content_hash("content a"), compute_content_hash("content b"));
    }

    #[test]
    fn frontmatter_parsed_and_stripped() {
        let content = "---\ntitle: Hello\ntags: [a, b]\n---\nBody text here.\n";
        let (fm, body) = split_frontmatter(content);
        let fm = fm.unwrap();
        assert_eq!(fm.get("title").unwrap(), "Hello");
        assert!(!body.contains("---"));
        assert!(body.contains("Body text here."));
    }

    #[test]
    fn no_frontmatter_leaves_body_untouched() {
        let content = "# Just a heading\nSome text.\n";
        let (fm, body) = split_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn wikilinks_extracted_with_and_without_alias() {
        let body = "See [[Other Page]] and [[Target|Display Text]].";
        let links = extract_links(body);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Other Page");
        assert_eq!(links[0].alias, None);
        assert_eq!(links[1].target, "Target");
        assert_eq!(links[1].alias, Some("Display Text".to_string()));
    }

    #[test]
    fn transclusion_excluded_from_plain_links() {
        let body = "Normal [[Page A]] vs transclusion ![[Page B]].";
        let links = extract_links(body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Page A");
    }

    #[test]
    fn transclusion_with_header_parsed() {
        let body = "Embed this: ![[Notes#Summary]]";
        let t = extract_transclusions(body);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].target_page, "Notes");
        assert_eq!(t[0].target_header, Some("Summary".to_string()));
    }

    #[test]
    fn transclusion_without_header_parsed() {
        let t = extract_transclusions("![[WholePage]]");
        assert_eq!(t[0].target_page, "WholePage");
        assert_eq!(t[0].target_header, None);
    }

    #[test]
    fn hashtags_extracted_lowercased_and_deduped() {
        let body = "This is #Rust and #rust and #async code.";
        let tags = extract_hashtags(body);
        assert_eq!(tags, vec!["rust".to_string(), "async".to_string()]);
    }

    #[test]
    fn hashtag_not_matched_inside_url_path() {
        let body = "visit http://example.com/page#anchor for more";
        let tags = extract_hashtags(body);
        assert!(tags.is_empty());
    }

    #[test]
    fn hashtag_not_matched_after_backtick() {
        let body = "use `#define` in C code";
        let tags = extract_hashtags(body);
        assert!(tags.is_empty());
    }

    #[test]
    fn inline_attribute_parsed() {
        let body = "Status: [status: in-progress] and done.";
        let attrs = extract_attributes(body);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "status");
        assert_eq!(attrs[0].value, "in-progress");
    }

    #[test]
    fn markdown_link_not_parsed_as_attribute() {
        let body = "See [status: page](https://example.com) for details.";
        let attrs = extract_attributes(body);
        assert!(attrs.is_empty());
    }

    #[test]
    fn data_block_parsed_as_yaml() {
        let body = "```#meeting\nattendees: [a, b]\nduration: 30\n```\n";
        let blocks = extract_data_blocks(body);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].tag, "meeting");
        assert_eq!(blocks[0].data.get("duration").unwrap(), 30);
    }

    #[test]
    fn tags_merge_content_and_frontmatter() {
        let fm = serde_json::json!({"tags": ["Project", "rust"]});
        let merged = merge_tags(vec!["async".to_string()], &Some(fm));
        assert_eq!(merged, vec!["async", "project", "rust"]);
    }

    #[test]
    fn exclusion_rejects_proposal_suffix() {
        assert!(is_excluded(&PathBuf::from("Notes/Idea.proposal.md")));
    }

    #[test]
    fn exclusion_rejects_rejected_suffix() {
        assert!(is_excluded(&PathBuf::from("Notes/Idea.rejected.md")));
    }

    #[test]
    fn exclusion_rejects_proposals_segment() {
        assert!(is_excluded(&PathBuf::from("_Proposals/Draft.md")));
    }

    #[test]
    fn exclusion_rejects_hidden_directory() {
        assert!(is_excluded(&PathBuf::from(".obsidian/config.md")));
    }

    #[test]
    fn exclusion_allows_normal_file() {
        assert!(!is_excluded(&PathBuf::from("Projects/Notes.md")));
    }

    #[test]
    fn heading_levels_and_text() {
        let body = "# Title\n\n## Section One\ncontent\n### Sub\n";
        let headings = extract_headings(body);
        assert_eq!(headings.len(), 3);
        assert_eq!(headings[0].level, 1);
        assert_eq!(headings[1].text, "Section One");
        assert_eq!(headings[2].level, 3);
    }
}
