use std::path::Path;

use mdvdb::chunker::chunk_document;
use mdvdb::parser::parse_markdown_file;
use tempfile::TempDir;

fn parse_content(content: &str) -> mdvdb::parser::MarkdownFile {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("Note.md"), content).unwrap();
    parse_markdown_file(tmp.path(), Path::new("Note.md"), true).unwrap()
}

#[test]
fn chunks_split_on_h2_boundaries() {
    let file = parse_content("Intro text.\n## Installation\nsteps here\n## Configuration\nmore steps\n");
    let chunks = chunk_document(&file);

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].header, "Note");
    assert_eq!(chunks[1].header, "Installation");
    assert_eq!(chunks[2].header, "Configuration");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_order, i);
        assert_eq!(chunk.id, format!("Note.md#{}", chunk.header));
    }
}

#[test]
fn file_with_no_h2_headings_is_one_chunk() {
    let file = parse_content("# Title\nJust a single section with no subheadings.\n");
    let chunks = chunk_document(&file);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].header, "Note");
}

#[test]
fn empty_file_produces_single_empty_chunk() {
    let file = parse_content("");
    let chunks = chunk_document(&file);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "");
}

#[test]
fn frontmatter_tags_attach_only_to_leading_chunk() {
    let file = parse_content("---\ntags: [project]\n---\nIntro\n## Details\nbody #rust\n");
    let chunks = chunk_document(&file);

    assert!(chunks[0].tags.contains(&"project".to_string()));
    assert!(!chunks[1].tags.contains(&"project".to_string()));
    assert!(chunks[1].tags.contains(&"rust".to_string()));
}

#[test]
fn wikilinks_are_scoped_to_their_own_chunk() {
    let file = parse_content("## First\nSee [[Other Page]].\n## Second\nNo links here.\n");
    let chunks = chunk_document(&file);

    assert_eq!(chunks[0].links.len(), 1);
    assert_eq!(chunks[0].links[0].target, "Other Page");
    assert!(chunks[1].links.is_empty());
}

#[test]
fn transclusion_header_expansion_replaces_directive_with_subsection() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("B.md"),
        "# B\n## Section One\nFirst section.\n## Section Two\nSecond section body.\n## Section Three\nThird.\n",
    )
    .unwrap();
    std::fs::write(tmp.path().join("A.md"), "## Intro\n![[B#Section Two]]\n").unwrap();

    let file = parse_markdown_file(tmp.path(), Path::new("A.md"), true).unwrap();
    let chunks = chunk_document(&file);

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("Second section body."));
    assert!(!chunks[0].content.contains("First section."));
    assert!(!chunks[0].content.contains("Third."));
}
