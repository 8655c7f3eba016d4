//! SQL `LIKE` helpers shared by catalog implementations.

use regex::Regex;

const ESCAPE: char = '\\';

/// Escape `%`, `_` and the escape character so `text` matches literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | ESCAPE) {
            escaped.push(ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

/// Anchored, case-sensitive regex equivalent of a `LIKE` pattern. `%` matches
/// any run and `_` a single character; a backslash escapes the next one.
pub fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::from("(?s)^");
    let mut buf = [0u8; 4];
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            ESCAPE => {
                let literal = chars.next().unwrap_or(ESCAPE);
                translated.push_str(&regex::escape(literal.encode_utf8(&mut buf)));
            }
            other => translated.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    translated.push('$');
    Regex::new(&translated)
}

/// Case-sensitive `text LIKE pattern`. A pattern too large to compile
/// matches nothing.
pub fn like_matches(pattern: &str, text: &str) -> bool {
    like_regex(pattern).is_ok_and(|regex| regex.is_match(text))
}
