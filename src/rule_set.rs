//! Rule text store for one list.
//!
//! A `RuleSet` keeps every authored line (valid or not) for display and
//! export, a map from canonical rule to its record, and a lazily built
//! [`MatchIndex`] that is rebuilt on the first query after a change.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::compile::MatchIndex;
use crate::config::MergeLimits;
use crate::parser::get_lines;
use crate::types::{ListKind, ParsedRule};

/// One authored rule line and what it parsed to.
#[derive(Debug, Clone)]
pub struct RuleLine {
    pub text: String,
    pub parsed: Arc<ParsedRule>,
}

/// The rules of one list.
#[derive(Debug)]
pub struct RuleSet {
    kind: ListKind,
    /// Web list URLs this set was loaded from, in load order
    sources: Vec<String>,
    lines: Vec<RuleLine>,
    line_keys: HashSet<String>,
    /// Canonical rule -> record; a later line with the same canonical rule
    /// replaces the earlier record
    rules: HashMap<String, Arc<ParsedRule>>,
    /// Bumped on every change
    generation: u64,
    compiled: Mutex<Option<(u64, Arc<MatchIndex>)>>,
    limits: MergeLimits,
}

impl RuleSet {
    pub fn new(kind: ListKind, limits: MergeLimits) -> Self {
        Self {
            kind,
            sources: Vec::new(),
            lines: Vec::new(),
            line_keys: HashSet::new(),
            rules: HashMap::new(),
            generation: 0,
            compiled: Mutex::new(None),
            limits,
        }
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    /// Add every line of `text`, parsing each with `parse`.
    ///
    /// Blank lines and lines already present are skipped. Lines whose rule
    /// is invalid are stored but never matched. Returns the number of lines
    /// added.
    pub fn add_text<F>(&mut self, text: &str, source: Option<&str>, parse: F) -> usize
    where
        F: Fn(&str) -> ParsedRule,
    {
        if let Some(url) = source {
            self.sources.push(url.to_string());
        }

        let mut added = 0;
        for line in get_lines(text) {
            if line.trim().is_empty() {
                continue;
            }

            let mut parsed = parse(line);
            parsed.source = source.map(str::to_string);
            let parsed = Arc::new(parsed);
            if parsed.is_valid() {
                self.rules.insert(parsed.rule.clone(), parsed.clone());
            }

            if self.line_keys.insert(line.to_string()) {
                self.lines.push(RuleLine {
                    text: line.to_string(),
                    parsed,
                });
                added += 1;
            }
        }

        self.generation += 1;
        added
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn lines(&self) -> &[RuleLine] {
        &self.lines
    }

    /// Look up the record of a canonical rule.
    pub fn get_rule(&self, rule: &str) -> Option<&Arc<ParsedRule>> {
        self.rules.get(rule)
    }

    pub fn contains_rule(&self, rule: &str) -> bool {
        self.rules.contains_key(rule)
    }

    /// Number of distinct canonical rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Valid lines rendered as `rule + separator + comment`, one per line.
    pub fn merged_text(&self) -> String {
        self.lines
            .iter()
            .filter(|line| line.parsed.is_valid())
            .map(|line| line.parsed.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Remove all rules and sources.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.lines.clear();
        self.line_keys.clear();
        self.rules.clear();
        self.generation += 1;
    }

    /// True if the rules changed since the index was last built.
    pub fn is_dirty(&self) -> bool {
        match &*self.compiled.lock() {
            Some((generation, _)) => *generation != self.generation,
            None => true,
        }
    }

    /// Distinct rule records in first-seen line order.
    fn ordered_rules(&self) -> Vec<Arc<ParsedRule>> {
        let mut seen = HashSet::new();
        self.lines
            .iter()
            .filter(|line| line.parsed.is_valid())
            .filter_map(|line| {
                let rule = line.parsed.rule.as_str();
                if !seen.insert(rule) {
                    return None;
                }
                self.rules.get(rule).cloned()
            })
            .collect()
    }

    /// The match index for the current rules, building it if stale.
    ///
    /// Concurrent callers wait for a single build; the returned index is
    /// never mutated afterwards.
    pub fn compiled(&self) -> Arc<MatchIndex> {
        let mut compiled = self.compiled.lock();
        if let Some((generation, index)) = &*compiled {
            if *generation == self.generation {
                return index.clone();
            }
        }

        let index = Arc::new(MatchIndex::build(&self.ordered_rules(), self.limits));
        tracing::debug!(
            list = ?self.kind,
            hostname_rules = index.hostname_rule_count(),
            pattern_rules = index.pattern_rule_count(),
            matchers = index.matcher_count(),
            "compiled rule set"
        );
        *compiled = Some((self.generation, index.clone()));
        index
    }
}
