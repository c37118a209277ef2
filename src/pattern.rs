//! Brace expansion for watch patterns.
//!
//! Expands shell-style brace alternatives (`/var/log/{auth,secure}*.log`)
//! into the cross-product of concrete glob patterns before they are handed
//! to the tailer. Nested braces are not supported, and literal brace
//! characters in filenames cannot be escaped.

/// Expand every `{a,b,c}` group in `pattern` into the full cross-product.
///
/// A pattern without braces expands to itself. An unmatched `{` is treated
/// as a literal character.
///
/// # Examples
/// ```
/// use blocktail::pattern::expand_braces;
/// assert_eq!(expand_braces("a/{x,y}/b"), vec!["a/x/b", "a/y/b"]);
/// assert_eq!(expand_braces("plain"), vec!["plain"]);
/// ```
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let head = &pattern[..open];
    let body = &pattern[open + 1..close];
    let tail = &pattern[close + 1..];

    let mut expanded = Vec::new();
    for alternative in body.split(',') {
        for rest in expand_braces(tail) {
            expanded.push(format!("{}{}{}", head, alternative, rest));
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_braces() {
        assert_eq!(expand_braces("/var/log/auth.log"), vec!["/var/log/auth.log"]);
    }

    #[test]
    fn test_single_group() {
        assert_eq!(
            expand_braces("/var/log/{auth,secure}.log"),
            vec!["/var/log/auth.log", "/var/log/secure.log"]
        );
    }

    #[test]
    fn test_cross_product() {
        assert_eq!(
            expand_braces("{a,b}/{x,y}"),
            vec!["a/x", "a/y", "b/x", "b/y"]
        );
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(
            expand_braces("auth{,.1}.log"),
            vec!["auth.log", "auth.1.log"]
        );
    }

    #[test]
    fn test_unmatched_brace_is_literal() {
        assert_eq!(expand_braces("a{b"), vec!["a{b"]);
        assert_eq!(expand_braces("a}b"), vec!["a}b"]);
    }

    #[test]
    fn test_group_with_glob() {
        assert_eq!(
            expand_braces("/var/log/{mail,auth}*.log"),
            vec!["/var/log/mail*.log", "/var/log/auth*.log"]
        );
    }

    #[test]
    fn test_single_alternative() {
        assert_eq!(expand_braces("{only}"), vec!["only"]);
    }
}
