//! Logging utilities for sanitizing user-derived strings (notification
//! text, search terms) so log lines stay single-line and readable.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings (over `max_preview`) with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300; // generous for debug; adjust if needed
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                // Represent other control chars as hex \xNN
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
