use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// Delimited regex rule: `/expr/flags`
static REGEX_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(.*)/([a-z]*)$").expect("REGEX_RULE: hardcoded regex is invalid")
});

/// Which rule list a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Blacklist,
    Whitelist,
}

/// Outcome of a block query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlockOutcome {
    #[default]
    Allowed,
    /// Hostname matched a standard (hostname glob) rule
    BlockedByDomain,
    /// URL matched a regex rule
    BlockedByPattern,
}

impl BlockOutcome {
    /// Only `Allowed` counts as not blocked.
    pub fn is_blocked(&self) -> bool {
        !matches!(self, BlockOutcome::Allowed)
    }

    /// Numeric block type: 0 allowed, 1 by hostname, 2 by pattern.
    pub fn code(&self) -> u8 {
        match self {
            BlockOutcome::Allowed => 0,
            BlockOutcome::BlockedByDomain => 1,
            BlockOutcome::BlockedByPattern => 2,
        }
    }
}

/// The two rule kinds a canonical rule string can denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind<'a> {
    /// Hostname glob, `*` matches any run of characters
    Glob(&'a str),
    /// Delimited regex rule, split into body and flags
    Regex { body: &'a str, flags: &'a str },
}

impl<'a> RuleKind<'a> {
    /// Classify rule text by its shape.
    pub fn classify(rule: &'a str) -> Self {
        match REGEX_RULE.captures(rule) {
            Some(caps) => {
                // Both groups always participate when the pattern matches.
                let body = caps.get(1).map_or("", |m| m.as_str());
                let flags = caps.get(2).map_or("", |m| m.as_str());
                RuleKind::Regex { body, flags }
            }
            None => RuleKind::Glob(rule),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, RuleKind::Regex { .. })
    }
}

/// Check whether text is a delimited regex rule.
pub fn is_regex_rule(rule: &str) -> bool {
    REGEX_RULE.is_match(rule)
}

/// One rule line split into its canonical rule and trailing annotation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedRule {
    /// Canonical rule text; empty when the line is not a valid rule
    pub rule: String,
    /// Whitespace between the rule and the comment
    pub separator: String,
    /// Free text after the rule
    pub comment: String,
    /// URL of the web list this rule came from
    pub source: Option<String>,
}

impl ParsedRule {
    pub fn is_valid(&self) -> bool {
        !self.rule.is_empty()
    }
}

impl fmt::Display for ParsedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.rule, self.separator, self.comment)
    }
}

/// A URL to check, optionally with the URL it was redirected to.
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub url: String,
    pub url_redirected: Option<String>,
}

impl Source {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            url_redirected: None,
        }
    }

    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.url_redirected = Some(url.into());
        self
    }
}

/// Result of a block query with the rule that decided it.
#[derive(Debug, Clone, Default)]
pub struct Blocker {
    pub outcome: BlockOutcome,
    /// The deciding rule; a whitelist rule when the outcome is `Allowed`
    pub rule: Option<Arc<ParsedRule>>,
}

impl Blocker {
    pub fn new(outcome: BlockOutcome, rule: Arc<ParsedRule>) -> Self {
        Self {
            outcome,
            rule: Some(rule),
        }
    }

    pub fn allowed() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.outcome.is_blocked()
    }
}
