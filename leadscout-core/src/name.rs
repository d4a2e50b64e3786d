//! Name normalization (spec §3 `Name`).

use crate::error::{Error, Result};

/// Trim, collapse internal whitespace, and fold case for matching while
/// preserving the caller's original string separately.
///
/// Returns `Err(Error::InvalidInput)` for empty or whitespace-only input,
/// per spec §3: "Empty or whitespace-only is rejected upstream."
pub fn normalize(original: &str) -> Result<String> {
    let collapsed = original.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(Error::invalid_input("name is empty or whitespace-only"));
    }
    Ok(collapsed.to_lowercase())
}

/// Tokenize an already-normalized name on whitespace.
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// The first `n` characters of `token`, or `None` if it has fewer than
/// `n`. Character-based (not byte-based) so it never panics on a
/// multi-byte UTF-8 boundary, unlike a raw `token[..n]` slice.
pub fn prefix(token: &str, n: usize) -> Option<String> {
    let prefix: String = token.chars().take(n).collect();
    (prefix.chars().count() == n).then_some(prefix)
}

/// The last `n` characters of `token`, or `None` if it has fewer than
/// `n`. Character-based for the same reason as [`prefix`].
pub fn suffix(token: &str, n: usize) -> Option<String> {
    let total = token.chars().count();
    if total < n {
        return None;
    }
    Some(token.chars().skip(total - n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_folds_case() {
        assert_eq!(normalize("  Van  DER  Merwe ").unwrap(), "van der merwe");
    }

    #[test]
    fn rejects_blank_input() {
        assert!(normalize("   ").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn tokenizes_on_whitespace() {
        assert_eq!(tokenize("andreas petrus van der merwe"), vec!["andreas", "petrus", "van", "der", "merwe"]);
    }

    #[test]
    fn prefix_and_suffix_are_none_when_too_short() {
        assert_eq!(prefix("jo", 3), None);
        assert_eq!(suffix("jo", 3), None);
    }

    #[test]
    fn prefix_and_suffix_are_char_safe_on_multibyte_input() {
        // "é" is a single character but two UTF-8 bytes; a byte-range
        // slice at the wrong boundary would panic.
        assert_eq!(prefix("élodie", 2), Some("él".to_string()));
        assert_eq!(suffix("rené", 2), Some("né".to_string()));
    }
}
