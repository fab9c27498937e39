//! Glob patterns
//!
//! Redis-style key patterns: `*` matches any run of characters, `?` a single
//! character, everything else is literal. Matches are anchored at both ends.

use regex::Regex;

/// Compile a glob into an anchored regex
///
/// # Errors
///
/// Returns an error only if the generated expression exceeds regex size limits.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    let mut literal = [0u8; 4];
    for ch in glob.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}
