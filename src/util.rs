//! Shared utility functions used across the codebase.

/// Parse an environment variable, returning `default` if unset or empty.
///
/// Values that fail to parse are reported back to the caller as the raw string
/// so configuration errors can name the offending input.
pub fn env_var_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse().map_err(|_| value),
        _ => Ok(default),
    }
}

/// Read an optional, non-empty environment variable.
pub fn env_var_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Largest byte index `<= max` that falls on a char boundary of `s`.
pub fn safe_truncate_index(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// First `max_chars` characters of `s`.
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip surrounding quote and backtick characters.
pub fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '\'' || c == '"' || c == '`')
}
