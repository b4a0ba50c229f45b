//! Text preprocessing shared by the retrieval tiers.
//!
//! - Tokenization for lexical scoring
//! - Short previews of note bodies
//! - Display titles derived from note paths

/// Maximum preview length (characters, not bytes)
const MAX_PREVIEW_LENGTH: usize = 200;

/// Ellipsis suffix when a preview is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Split text into lowercase terms.
///
/// Anything that is not a letter or digit acts as a separator, so
/// `rust-lang` yields `rust` and `lang`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Build a single-line preview of a note body.
///
/// Returns `None` when the body has no visible text.
pub fn preview(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    Some(truncate_content(&collapsed))
}

/// Truncate content to MAX_PREVIEW_LENGTH characters, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_PREVIEW_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_PREVIEW_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated.trim_end(), TRUNCATION_SUFFIX)
}

/// Display title for a note: the file name without its extension.
pub fn title_from_path(path: &str) -> Option<String> {
    let name = path.rsplit(&['/', '\\'][..]).next()?;
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    };

    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
