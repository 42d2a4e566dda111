//! Shared utility functions
//!
//! Glob matching for `safe_match` and identifier sanitising for item
//! property names.

use regex::Regex;
use std::sync::OnceLock;

/// Shell-style glob match (`*`, `?`, `[seq]`, `[!seq]`), case-insensitive.
///
/// Examples: "DDR*" matches "ddr5-6000", "LGA1?00" matches "lga1700"
pub fn glob_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let (mut t, mut p) = (0, 0);
    // Position after the last `*` and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    t += 1;
                    p += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&pattern, p, text[t]) {
                        if matched {
                            t += 1;
                            p = next;
                            continue;
                        }
                    } else if text[t] == '[' {
                        // unterminated class is a literal '['
                        t += 1;
                        p += 1;
                        continue;
                    }
                }
                c if c == text[t] => {
                    t += 1;
                    p += 1;
                    continue;
                }
                _ => {}
            }
        }
        match backtrack {
            Some((star_p, star_t)) => {
                backtrack = Some((star_p, star_t + 1));
                p = star_p;
                t = star_t + 1;
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Match `c` against the class starting at `pattern[start] == '['`.
/// Returns (matched, index after the class), or None if the class is unterminated.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let lo = pattern[i];
        if lo == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|hi| *hi != ']') {
            let hi = pattern[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_\p{Han}]").ok())
        .as_ref()
}

/// Turn an arbitrary property name into an expression identifier.
///
/// Examples: "max-length" -> "max_length", "3d" -> "prop_3d", "" -> "unknown_prop"
pub fn sanitize_identifier(name: &str) -> String {
    let trimmed = name.trim();
    let cleaned = match identifier_pattern() {
        Some(pattern) => pattern.replace_all(trimmed, "_").into_owned(),
        None => trimmed
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect(),
    };
    if cleaned.is_empty() {
        return "unknown_prop".to_string();
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("prop_{}", cleaned);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_wildcards() {
        assert!(glob_match("DDR5-6000", "ddr*"));
        assert!(glob_match("lga1700", "LGA1?00"));
        assert!(glob_match("anything", "*"));
        assert!(glob_match("", "*"));
        assert!(!glob_match("ddr4", "ddr5*"));
        assert!(glob_match("a-b-c", "a*c"));
        assert!(glob_match("abcbc", "*bc"));
        assert!(!glob_match("abc", "a?"));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob_match("ddr5", "ddr[45]"));
        assert!(!glob_match("ddr3", "ddr[45]"));
        assert!(glob_match("ddr3", "ddr[!45]"));
        assert!(glob_match("x7", "x[0-9]"));
        assert!(glob_match("a[b", "a[b"));
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("max-length"), "max_length");
        assert_eq!(sanitize_identifier("Power Draw (W)"), "Power_Draw__W_");
        assert_eq!(sanitize_identifier("3d_support"), "prop_3d_support");
        assert_eq!(sanitize_identifier("电压"), "电压");
        assert_eq!(sanitize_identifier("  "), "unknown_prop");
    }
}
