use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::provider::EmbeddingProvider;

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap())
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[^\w])[#@]([A-Za-z][A-Za-z0-9_-]*)").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn space_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").unwrap())
}

/// Clean chunk text for embedding: strip any leading `---` lines, resolve
/// wikilinks to their display text, unwrap `#tag`/`@mention` markers, and
/// collapse whitespace. Mirrors the text-cleaning contract of the embedding
/// client — cleaning happens before every `embed_batch` call, never after.
pub fn clean_text(raw: &str) -> String {
    let without_dashes = strip_leading_dashes(raw);
    let without_wikilinks = wikilink_re()
        .replace_all(&without_dashes, |caps: &Captures| {
            let inner = caps.get(1).unwrap().as_str();
            if let Some(pos) = inner.find('|') {
                inner[pos + 1..].trim().to_string()
            } else if let Some(pos) = inner.find('#') {
                inner[..pos].trim().to_string()
            } else {
                inner.trim().to_string()
            }
        })
        .into_owned();
    let without_markers = marker_re()
        .replace_all(&without_wikilinks, |caps: &Captures| {
            format!(
                "{}{}",
                caps.get(1).map(|m| m.as_str()).unwrap_or(""),
                caps.get(2).unwrap().as_str()
            )
        })
        .into_owned();

    let collapsed = blank_run_re().replace_all(&without_markers, "\n\n");
    let collapsed = space_run_re().replace_all(&collapsed, " ");
    collapsed.trim().to_string()
}

fn strip_leading_dashes(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.first().map(|l| l.trim() == "---").unwrap_or(false) {
        lines.remove(0);
    }
    lines.join("\n")
}

/// Clean and embed a batch of texts, preserving input order. Texts that clean
/// to an empty string receive the zero vector without a provider call; the
/// provider is only invoked (at most once) over the remaining non-empty texts.
/// Returns the embedded vectors alongside whether the provider was actually called.
pub async fn embed_batch_with_cleaning(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> crate::Result<(Vec<Vec<f32>>, bool)> {
    let dims = provider.dimensions();
    let cleaned: Vec<String> = texts.iter().map(|t| clean_text(t)).collect();

    let mut to_embed = Vec::new();
    let mut to_embed_slots = Vec::new();
    for (idx, text) in cleaned.iter().enumerate() {
        if !text.is_empty() {
            to_embed_slots.push(idx);
            to_embed.push(text.clone());
        }
    }

    let mut result = vec![vec![0.0f32; dims]; cleaned.len()];
    let called = !to_embed.is_empty();
    if called {
        let vectors = provider.embed_batch(&to_embed).await?;
        for (slot, vector) in to_embed_slots.into_iter().zip(vectors) {
            result[slot] = vector;
        }
    }
    Ok((result, called))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockProvider;

    #[test]
    fn strips_leading_frontmatter_dashes() {
        assert_eq!(clean_text("---\nBody text"), "Body text");
    }

    #[test]
    fn resolves_aliased_wikilink_to_alias() {
        assert_eq!(clean_text("See [[Target Page|Display Text]] for more."), "See Display Text for more.");
    }

    #[test]
    fn resolves_plain_wikilink_to_page_name() {
        assert_eq!(clean_text("See [[Other Page]] for more."), "See Other Page for more.");
    }

    #[test]
    fn resolves_headered_wikilink_to_page_name() {
        assert_eq!(clean_text("See [[Other Page#Section]]."), "See Other Page.");
    }

    #[test]
    fn strips_hashtag_and_mention_markers() {
        assert_eq!(clean_text("Ping #rust and @alice about this."), "Ping rust and alice about this.");
    }

    #[test]
    fn collapses_blank_line_runs_and_space_runs() {
        assert_eq!(clean_text("one\n\n\n\ntwo   three"), "one\n\ntwo three");
    }

    #[test]
    fn whitespace_only_input_cleans_to_empty() {
        assert_eq!(clean_text("   \n\n  "), "");
    }

    #[tokio::test]
    async fn empty_after_cleaning_yields_zero_vector_without_provider_call() {
        let provider = MockProvider::new(8);
        let texts = vec!["---\n".to_string(), "real content".to_string()];

        let (vectors, called) = embed_batch_with_cleaning(&provider, &texts).await.unwrap();

        assert!(called);
        assert_eq!(vectors[0], vec![0.0f32; 8]);
        assert_ne!(vectors[1], vec![0.0f32; 8]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn all_empty_batch_skips_provider_entirely() {
        let provider = MockProvider::new(8);
        let texts = vec!["---\n".to_string(), "   ".to_string()];

        let (vectors, called) = embed_batch_with_cleaning(&provider, &texts).await.unwrap();

        assert!(!called);
        assert_eq!(vectors, vec![vec![0.0f32; 8]; 2]);
        assert_eq!(provider.call_count(), 0);
    }
}
