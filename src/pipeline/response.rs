//! Response parsing: coerce a raw LLM reply into JSON.
//!
//! Models are asked for a bare JSON array but routinely wrap it in a
//! ```` ```json ```` fence or surround it with prose ("Here are the parts
//! I found: …"). Parsing therefore tries, in order:
//!
//! 1. strip an outer code fence;
//! 2. the first well-formed JSON **array** starting at any `[`;
//! 3. the first well-formed JSON **object** starting at any `{`;
//! 4. the whole trimmed reply.
//!
//! Anything else is "no items". Parsing never fails loudly.

use crate::output::ExtractedItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\n?[ \t]*```\s*$").unwrap()
});

/// Parse the first JSON value out of a raw reply.
pub fn parse_response(raw: &str) -> Option<Value> {
    let cleaned = strip_fences(raw.trim());

    first_value_at(&cleaned, '[')
        .or_else(|| first_value_at(&cleaned, '{'))
        .or_else(|| serde_json::from_str(cleaned.trim()).ok())
}

/// Items carried by a reply: the object elements of a non-empty JSON array.
///
/// A lone object, a scalar or an unparsable reply yields no items.
pub fn items_from_response(raw: &str) -> Vec<ExtractedItem> {
    match parse_response(raw) {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn strip_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input) {
        return caps[1].trim().to_string();
    }
    // Opening fence without a closing one (truncated reply).
    if input.starts_with("```") {
        return input
            .lines()
            .skip(1)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }
    input.to_string()
}

/// Try every occurrence of `open` and return the first position where a
/// complete JSON value parses. Trailing text after the value is ignored.
fn first_value_at(text: &str, open: char) -> Option<Value> {
    text.match_indices(open).find_map(|(i, _)| {
        serde_json::Deserializer::from_str(&text[i..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
    })
}
