//! Best-effort text extraction from provider responses.
//!
//! Providers answer with JSON-ish payloads, but only one string out of them
//! is ever needed. Instead of modelling each schema we locate a marker and
//! read the JSON string literal that follows it.

/// Extract the JSON string literal starting right after `marker`.
///
/// The literal ends at the first unescaped `"`. Escapes inside it are
/// decoded. Returns an empty string when the body is not UTF-8, the marker
/// or terminator is missing, the literal is empty, or an escape is invalid.
pub(super) fn string_after(body: &[u8], marker: &str) -> String {
    let Ok(text) = std::str::from_utf8(body) else {
        return String::new();
    };
    let Some(pos) = text.find(marker) else {
        return String::new();
    };
    let rest = &text[pos + marker.len()..];

    let mut escaped = false;
    let mut end = None;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }

    match end {
        Some(0) | None => String::new(),
        Some(end) => decode_literal(&rest[..end]),
    }
}

/// Decode the body of a JSON string literal (without surrounding quotes).
fn decode_literal(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_default()
}
