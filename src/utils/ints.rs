//! Integer literal parsing for query parameters
//!
//! Accepts what a base-10 integer literal accepts: surrounding whitespace,
//! an optional sign, and single underscores between digits.

use crate::models::errors::{AppError, AppResult};

/// Quote `raw` the way a string repr does: single quotes unless the text
/// holds a single quote and no double quote
pub fn quoted(raw: &str) -> String {
    let quote = if raw.contains('\'') && !raw.contains('"') { '"' } else { '\'' };

    let mut out = String::with_capacity(raw.len() + 2);
    out.push(quote);
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = c as u32;
                if code < 0x100 {
                    out.push_str(&format!("\\x{:02x}", code));
                } else {
                    out.push_str(&format!("\\u{:04x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Parse a base-10 integer literal
pub fn parse_int(raw: &str) -> AppResult<i64> {
    let invalid = || AppError::bad_request(format!("invalid literal for int() with base 10: {}", quoted(raw)));

    let trimmed = raw.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if body.is_empty() || body.starts_with('_') || body.ends_with('_') || body.contains("__") {
        return Err(invalid());
    }

    let mut digits = String::with_capacity(body.len() + 1);
    if negative {
        digits.push('-');
    }
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '_' => {}
            _ => return Err(invalid()),
        }
    }

    digits
        .parse::<i64>()
        .map_err(|_| AppError::bad_request(format!("int too large to convert: {}", quoted(raw))))
}
