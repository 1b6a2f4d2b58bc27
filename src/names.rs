// src/names.rs

//! Name normalization helpers used by reconciliation and catalog matching
//!
//! All comparisons in the pipeline go through these functions so that
//! "SPT-Realism", "spt_realism" and "SPT Realism" are the same identity.

/// Characters stripped during normalization
const STRIP_CHARS: [char; 4] = ['-', '_', ' ', '.'];

/// Lowercase a name and strip separator characters
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !STRIP_CHARS.contains(c))
        .collect()
}

/// Remove a trailing "server" or "client" token from a name
///
/// The token only counts at a word boundary: a separator before it
/// ("mymod-server", "mymod server") or a CamelCase capital starting it
/// ("MyModServer"). Words that merely end in the token ("Observer") are left
/// alone. Returns the input unchanged when no suffix is present or when the
/// name IS the token (stripping would leave nothing).
pub fn strip_component_suffix(name: &str) -> String {
    let trimmed = name.trim_end();
    for token in ["server", "client"] {
        if trimmed.len() <= token.len() {
            continue;
        }
        let cut = trimmed.len() - token.len();
        // get() rather than slicing: non-ASCII names must not panic here
        let (base, tail) = match (trimmed.get(..cut), trimmed.get(cut..)) {
            (Some(base), Some(tail)) => (base, tail),
            _ => continue,
        };
        if !tail.eq_ignore_ascii_case(token) {
            continue;
        }
        let at_boundary = base.ends_with(STRIP_CHARS)
            || tail.chars().next().is_some_and(|c| c.is_uppercase());
        if !at_boundary {
            continue;
        }
        let base = base.trim_end_matches(STRIP_CHARS);
        if !base.is_empty() {
            return base.to_string();
        }
    }
    trimmed.to_string()
}

/// Last dot/dash/underscore-delimited segment of a GUID
///
/// "com.acme.bigmod" -> "bigmod". GUIDs without delimiters return whole.
pub fn guid_tail(guid: &str) -> &str {
    guid.rsplit(['.', '-', '_']).next().unwrap_or(guid)
}

/// Expand a CamelCase term into space-separated words
///
/// "BigHideoutMod" -> "Big Hideout Mod". A term that is entirely uppercase is
/// treated as an acronym and returned unchanged ("SAIN" stays "SAIN").
pub fn split_camel_case(term: &str) -> String {
    if !term.chars().any(|c| c.is_lowercase()) {
        return term.to_string();
    }

    let mut out = String::with_capacity(term.len() + 4);
    let mut prev: Option<char> = None;
    for c in term.chars() {
        if c.is_uppercase() {
            if let Some(p) = prev {
                if p.is_lowercase() || p.is_numeric() {
                    out.push(' ');
                }
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Normalized equality of two names
pub fn names_equal(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && normalize(a) == normalize(b)
}

/// Normalized equality after stripping component suffixes from both sides
pub fn names_equal_stripped(a: &str, b: &str) -> bool {
    names_equal(&strip_component_suffix(a), &strip_component_suffix(b))
}
