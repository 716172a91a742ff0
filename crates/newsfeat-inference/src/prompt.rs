//! Extraction prompt rendering.

use newsfeat_core::defaults::{ARTICLE_CONTENT_MAX_CHARS, EMPTY_TITLE_PLACEHOLDER};

use crate::grok::parse::preview;

/// System message fixing the output to strict JSON.
pub const SYSTEM_PROMPT: &str =
    "You are a financial news feature extraction system. Output only valid JSON.";

/// User prompt template with `{title}` and `{content}` placeholders.
pub const EXTRACTION_TEMPLATE: &str = include_str!("../prompts/extraction.txt");

/// Render the extraction prompt for one article.
///
/// An empty title is replaced with a placeholder and the body is cut to the
/// first [`ARTICLE_CONTENT_MAX_CHARS`] characters. Placeholders are filled in
/// one pass, so braces inside the article text are left alone.
pub fn render_extraction_prompt(title: &str, content: &str) -> String {
    render(EXTRACTION_TEMPLATE, title, content)
}

fn render(template: &str, title: &str, content: &str) -> String {
    let title = if title.trim().is_empty() {
        EMPTY_TITLE_PLACEHOLDER
    } else {
        title
    };
    let content = preview(content, ARTICLE_CONTENT_MAX_CHARS);

    template
        .split("{content}")
        .map(|part| part.replace("{title}", title))
        .collect::<Vec<_>>()
        .join(content)
}
