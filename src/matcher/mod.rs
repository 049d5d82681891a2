pub mod domain;
pub mod glob_trie;
pub mod regex_set;
pub mod regex_source;

pub use domain::{hostname_match, is_ip_hostname};
pub use glob_trie::{GlobMatch, GlobTrie};
pub use regex_set::MergedRegexSet;
pub use regex_source::{anchor_sticky, compile_rule_regex, inline_flags, RegexSource};
