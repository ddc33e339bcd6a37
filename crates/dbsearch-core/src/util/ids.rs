//! SQL identifier normalization utilities.
//!
//! Table and column names are derived from index and field identifiers, which
//! may contain arbitrary characters. Everything stored in a storage descriptor
//! goes through [`sanitize_identifier`] and [`truncate_bytes`] first.

/// Normalize an identifier to the `[a-z0-9_]` alphabet.
///
/// Performs the following transformations:
/// 1. Converts to lowercase
/// 2. Replaces every character outside `[a-z0-9_]` with `_`
///
/// # Examples
///
/// ```
/// use dbsearch_core::util::ids::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("Body:Value"), "body_value");
/// assert_eq!(sanitize_identifier("field_1"), "field_1");
/// assert_eq!(sanitize_identifier("Über"), "_ber");
/// ```
pub fn sanitize_identifier(id: &str) -> String {
    id.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Truncate a string to at most `max_bytes` bytes on a char boundary.
///
/// # Examples
///
/// ```
/// use dbsearch_core::util::ids::truncate_bytes;
///
/// assert_eq!(truncate_bytes("abcdef", 3), "abc");
/// assert_eq!(truncate_bytes("ab", 3), "ab");
/// ```
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate a string to at most `max_chars` characters.
///
/// Returns the truncated string and whether anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => (s[..idx].to_string(), true),
        None => (s.to_string(), false),
    }
}

/// Whether `name` is a valid identifier within the given byte budget.
pub fn is_valid_identifier(name: &str, max_len: usize) -> bool {
    !name.is_empty()
        && name.len() <= max_len
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Build a candidate identifier `base` or `base_{n}` that fits `max_len`.
///
/// The base is re-truncated so the numeric suffix always fits.
///
/// # Examples
///
/// ```
/// use dbsearch_core::util::ids::suffixed_identifier;
///
/// assert_eq!(suffixed_identifier("body", 0, 10), "body");
/// assert_eq!(suffixed_identifier("body", 2, 10), "body_2");
/// assert_eq!(suffixed_identifier("abcdefghij", 1, 10), "abcdefgh_1");
/// ```
pub fn suffixed_identifier(base: &str, n: usize, max_len: usize) -> String {
    if n == 0 {
        return truncate_bytes(base, max_len).to_string();
    }
    let suffix = format!("_{n}");
    let budget = max_len.saturating_sub(suffix.len());
    format!("{}{}", truncate_bytes(base, budget), suffix)
}
