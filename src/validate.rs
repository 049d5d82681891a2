//! Rule canonicalization.
//!
//! A regex rule is kept as written if it compiles. Anything else is read as a
//! hostname glob: the hostname is pulled out of it as if it were a URL, then
//! lowercased, `*` runs collapsed, a leading `www.` dropped and the result
//! converted to punycode.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::idn::IdnNormalizer;
use crate::matcher::compile_rule_regex;
use crate::types::RuleKind;

/// A leading `scheme:`.
pub(crate) static SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][0-9A-Za-z.+-]*:").expect("SCHEME: hardcoded regex is invalid")
});

/// Stand in for characters URL parsing would reject or fold.
///
/// `x` is the escape character itself; `X` needs its own code because host
/// parsing lowercases it.
fn escape_host(rule: &str) -> String {
    let mut escaped = String::with_capacity(rule.len() + 8);
    for c in rule.chars() {
        match c {
            'x' => escaped.push_str("xx"),
            'X' => escaped.push_str("xX"),
            '*' => escaped.push_str("xa"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_host(host: &str) -> String {
    let mut unescaped = String::with_capacity(host.len());
    let mut chars = host.chars().peekable();
    while let Some(c) = chars.next() {
        if c == 'x' {
            match chars.peek() {
                Some('x') => {
                    chars.next();
                    unescaped.push('x');
                    continue;
                }
                Some('a') => {
                    chars.next();
                    unescaped.push('*');
                    continue;
                }
                _ => {}
            }
        }
        unescaped.push(c);
    }
    unescaped
}

/// Undo [`escape_host`] on a parsed hostname.
///
/// URL parsing has already punycoded non-ASCII labels, and their encoded
/// form may contain `xx` or `xa` by chance. Such labels are decoded before
/// unescaping; a label that cannot be decoded is left as parsed.
fn restore_host(host: &str, idn: &dyn IdnNormalizer) -> String {
    host.split('.')
        .map(|label| {
            if !label.starts_with("xn--") {
                return unescape_host(label);
            }
            let decoded = idn.to_unicode(label);
            if decoded.starts_with("xn--") {
                label.to_string()
            } else {
                unescape_host(&decoded)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn collapse_stars(host: &str) -> String {
    let mut collapsed = String::with_capacity(host.len());
    for c in host.chars() {
        if c == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Hostname glob of a standard rule, or `None` if it has no usable host.
fn canonical_host(rule: &str, idn: &dyn IdnNormalizer) -> Option<String> {
    let mut candidate = escape_host(rule);
    if !SCHEME.is_match(&candidate) {
        candidate.insert_str(0, "http://");
    }

    let parsed = match Url::parse(&candidate) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(rule, error = %e, "rule has no valid hostname");
            return None;
        }
    };
    let host = parsed.host_str().filter(|h| !h.is_empty())?;

    let host = collapse_stars(&restore_host(host, idn));
    let host = host.strip_prefix("www.").unwrap_or(&host);
    Some(idn.to_ascii(host))
}

/// Canonicalize one rule. Returns an empty string if it is invalid.
pub fn validate_rule(rule: &str, idn: &dyn IdnNormalizer) -> String {
    if rule.is_empty() {
        return String::new();
    }

    match RuleKind::classify(rule) {
        RuleKind::Regex { body, flags } => match compile_rule_regex(body, flags) {
            Ok(_) => rule.to_string(),
            Err(e) => {
                tracing::warn!(rule, error = %e, "invalid regex rule");
                String::new()
            }
        },
        RuleKind::Glob(_) => canonical_host(rule, idn).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idn::IdnaNormalizer;

    fn validate(rule: &str) -> String {
        validate_rule(rule, &IdnaNormalizer)
    }

    #[test]
    fn test_scheme_pattern_compiles() {
        assert!(SCHEME.is_match("https:"));
    }

    #[test]
    fn test_plain_hostname() {
        assert_eq!(validate("Example.COM"), "example.com");
        assert_eq!(validate("www.example.com"), "example.com");
        assert_eq!(validate("www.www.example.com"), "www.example.com");
    }

    #[test]
    fn test_url_is_reduced_to_hostname() {
        assert_eq!(validate("https://user:pw@sub.example.com:8080/path?q#f"), "sub.example.com");
        assert_eq!(validate("example.com/x/y"), "example.com");
    }

    #[test]
    fn test_wildcards_survive() {
        assert_eq!(validate("*.ads.example.com"), "*.ads.example.com");
        assert_eq!(validate("a**b***.example.com"), "a*b*.example.com");
        assert_eq!(validate("*.Xbox.com"), "*.xbox.com");
        assert_eq!(validate("xa.example.com"), "xa.example.com");
    }

    #[test]
    fn test_idn_is_punycoded() {
        assert_eq!(validate("例え.jp"), "xn--r8jz45g.jp");
        assert_eq!(validate("https://例え.jp/"), "xn--r8jz45g.jp");
    }

    #[test]
    fn test_punycode_with_escape_sequences() {
        // encoded forms contain `xx` and `xa`
        assert_eq!(validate("偌.jp"), "xn--xxq.jp");
        assert_eq!(validate("a儒.jp"), "xn--a-xx7a.jp");
        assert_eq!(validate("https://Sub.偌.jp/page"), "sub.xn--xxq.jp");
        assert_eq!(validate("*.偌.jp"), "*.xn--xxq.jp");
        assert_eq!(validate("xn--xxq.jp"), "xn--xxq.jp");
    }

    #[test]
    fn test_undecodable_label_is_kept() {
        assert_eq!(
            validate_rule("偌.jp", &crate::idn::NilIdnNormalizer),
            "xn--xxq.jp"
        );
    }

    #[test]
    fn test_ip_hosts() {
        assert_eq!(validate("192.168.0.1"), "192.168.0.1");
        assert_eq!(validate("http://[::1]:80/"), "[::1]");
    }

    #[test]
    fn test_regex_rules() {
        assert_eq!(validate(r"/evil\d+\.test/"), r"/evil\d+\.test/");
        assert_eq!(validate(r"/^https?:\/\/a\.test/i"), r"/^https?:\/\/a\.test/i");
        assert_eq!(validate("/(foo/"), "");
        assert_eq!(validate("/foo/z"), "");
    }

    #[test]
    fn test_invalid_rules_are_empty() {
        assert_eq!(validate(""), "");
        assert_eq!(validate("http://"), "");
        assert_eq!(validate("mailto:someone"), "");
    }

    #[test]
    fn test_idempotent() {
        for rule in [
            "www.Example.com",
            "https://sub.例え.jp/path",
            "偌.jp",
            "a儒.jp",
            "*.偌.jp",
            "www.X偌x.jp",
            "*.ads.example.com",
            "a**b.example.com",
            r"/evil\d+/i",
            "[::1]",
        ] {
            let once = validate(rule);
            assert_eq!(validate(&once), once, "rule: {}", rule);
        }
    }
}
