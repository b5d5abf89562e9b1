//! Prompts for LLM-based catalog extraction.
//!
//! Callers can override both prompts via
//! [`crate::config::ExtractionConfig::system_prompt`] and
//! [`crate::config::ExtractionConfig::extraction_prompt`]; the text here is
//! used only when no override is provided.

/// Default system prompt for structured extraction calls.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an expert at extracting structured data from catalog documents.";

/// Build the default extraction instructions for a catalog family.
pub fn default_extraction_prompt(catalog_type: &str) -> String {
    format!(
        r#"Extract every product listing from this {catalog_type} catalog page.

Return a JSON array. Each element is one listing with these fields when present:
- "part_number": the catalog part number exactly as printed (e.g. "86-1234")
- "make": vehicle or equipment manufacturer
- "model": model name
- "years": year or year range the part fits
- "position": fitment position (front, rear, left, right, inner, outer, side)
- "description": short description of the part
- "specifications": any further specifications, as an object

Rules:
- Only include data printed on the page; do not guess missing values
- Omit fields that do not apply instead of inventing them
- Return [] if the page has no listings
- Output ONLY the JSON array, with no commentary"#
    )
}

/// Build the user message for a text extraction call.
///
/// `text` is truncated to `max_chars` characters.
pub fn text_extraction_message(prompt: &str, text: &str, max_chars: usize) -> String {
    format!(
        "{prompt}\n\nText to analyze:\n{}",
        truncate_chars(text, max_chars)
    )
}

/// Truncate on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
