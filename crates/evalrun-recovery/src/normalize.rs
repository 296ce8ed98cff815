//! Rewriting foreign-escaped blocks into parseable JSON.
//!
//! The worker prints its results through a string representation that turns
//! control characters into two-character escapes (`\n`, `\t`, `\r`) and doubles
//! backslashes, including between JSON tokens where JSON forbids them. When the
//! results were JSON-encoded before that, every JSON escape inside a string
//! arrives doubled (`\\n`, `\\"`, `\\\\`). The rewrite happens in two
//! passes: decode the foreign escapes everywhere, then re-encode the contents of
//! every quoted string as valid JSON, keeping escapes that are already valid.

use std::fmt::Write;

/// Turn a foreign-escaped block into text that should parse as JSON.
pub fn normalize(block: &str) -> String {
    reescape_strings(&decode_foreign_escapes(block))
}

/// Decode `\n`, `\t`, `\r`, `\\` and `\'` in a single left-to-right pass.
///
/// Any other backslash is kept as-is together with the character after it.
pub fn decode_foreign_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.peek() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('\'') => '\'',
            _ => {
                out.push('\\');
                continue;
            }
        };
        chars.next();
        out.push(decoded);
    }

    out
}

/// Re-encode the contents of every double-quoted string as JSON.
///
/// Inside a string, valid JSON escapes (`\"`, `\\`, `\/`, `\b`, `\f`, `\n`,
/// `\r`, `\t`, `\uXXXX`) are kept, any other backslash is doubled and raw
/// control characters become escapes. Text outside strings is copied
/// unchanged, so structural newlines stay plain whitespace.
pub fn reescape_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut in_string = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if !in_string {
            out.push(c);
            if c == '"' {
                in_string = true;
            }
            continue;
        }

        match c {
            '"' => {
                out.push('"');
                in_string = false;
            }
            '\\' => match chars.peek().copied() {
                Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                    chars.next();
                    out.push('\\');
                    out.push(next);
                }
                Some('u') if starts_with_hex4(chars.clone().skip(1)) => {
                    out.push('\\');
                }
                _ => out.push_str("\\\\"),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                // Infallible for String.
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }

    out
}

fn starts_with_hex4(mut chars: impl Iterator<Item = char>) -> bool {
    (0..4).all(|_| chars.next().is_some_and(|c| c.is_ascii_hexdigit()))
}
