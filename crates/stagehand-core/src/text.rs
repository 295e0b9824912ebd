//! Text helpers for log output.

/// Maximum characters of an inbound payload echoed to debug logs.
pub const RECEIVED_LOG_CHARS: usize = 194;

/// Maximum characters of an outbound frame or rejected message echoed to logs.
pub const SENT_LOG_CHARS: usize = 64;

/// Trim `text` to at most `max_chars` characters, never splitting a char.
pub fn truncate_for_log(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Lossy UTF-8 view of a raw payload, trimmed for logging.
pub fn excerpt(payload: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(payload);
    truncate_for_log(&text, max_chars).to_owned()
}
