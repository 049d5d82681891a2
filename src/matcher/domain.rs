use once_cell::sync::Lazy;
use regex::Regex;

use super::glob_trie::{GlobMatch, GlobTrie};

/// Dotted-quad IPv4 hostname
static IPV4_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(?:\.\d{1,3}){3}$").expect("IPV4_HOSTNAME: hardcoded regex is invalid")
});

/// Whether a hostname is an IP literal that must not be split on dots.
pub fn is_ip_hostname(hostname: &str) -> bool {
    (hostname.starts_with('[') && hostname.ends_with(']')) || IPV4_HOSTNAME.is_match(hostname)
}

/// Match a hostname and each of its parent domains against the trie.
///
/// A leading `www.` is dropped first. The trie is then queried with the
/// hostname, and on a miss the leftmost label is peeled off and the query
/// repeated, until no dot remains. IP literals are looked up as one token.
/// Assumes `hostname` is already lowercased ASCII.
pub fn hostname_match<'a, V>(trie: &'a GlobTrie<V>, hostname: &str) -> Option<GlobMatch<'a, V>> {
    if trie.is_empty() || hostname.is_empty() {
        return None;
    }

    if is_ip_hostname(hostname) {
        return trie.find(hostname);
    }

    let mut domain = hostname.strip_prefix("www.").unwrap_or(hostname);
    loop {
        if let Some(found) = trie.find(domain) {
            return Some(found);
        }
        match domain.find('.') {
            Some(pos) => domain = &domain[pos + 1..],
            None => return None,
        }
    }
}
