//! Merged regex matchers.
//!
//! Testing a URL against thousands of independent regexes is slow, so rules
//! are merged. Rules sharing the same effective flags are joined into one
//! alternation until the alternation would exceed the group or source-length
//! ceiling; then it is sealed and a new one begins. Rules with
//! backreferences cannot be merged (joining renumbers their groups), so each
//! is compiled on its own with only its referenced groups left capturing.

use fancy_regex::Regex;
use once_cell::sync::OnceCell;

use super::regex_source::{anchor_sticky, inline_flags, RegexSource};
use crate::config::MergeLimits;

/// Extra source characters per merged member: `(?:`, `)` and `|`
const MEMBER_OVERHEAD: usize = 5;

/// One rule inside a compiled batch.
#[derive(Debug)]
struct Member<V> {
    /// Engine-ready source with the flag prefix
    source: String,
    /// Standalone regex, compiled on first attribution
    regex: OnceCell<Option<Regex>>,
    value: V,
}

impl<V> Member<V> {
    fn is_match(&self, text: &str) -> bool {
        let regex = self.regex.get_or_init(|| match Regex::new(&self.source) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(source = %self.source, error = %e, "failed to compile regex rule");
                None
            }
        });
        regex.as_ref().is_some_and(|re| test(re, text))
    }
}

/// A compiled alternation and the rules it was built from.
#[derive(Debug)]
struct Batch<V> {
    regex: Regex,
    members: Vec<Member<V>>,
}

/// A regex rule waiting to be merged.
struct Pending<V> {
    /// Engine-ready source without flags
    source: String,
    groups: usize,
    value: V,
}

/// A set of regex rules compiled into a small number of matchers.
#[derive(Debug)]
pub struct MergedRegexSet<V> {
    batches: Vec<Batch<V>>,
    rule_count: usize,
}

impl<V> Default for MergedRegexSet<V> {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            rule_count: 0,
        }
    }
}

fn test(regex: &Regex, text: &str) -> bool {
    match regex.is_match(text) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(error = %e, "regex evaluation aborted");
            false
        }
    }
}

impl<V> MergedRegexSet<V> {
    /// Build from `(body, flags, value)` triples.
    ///
    /// Rules with invalid flags or syntax are skipped with a warning.
    pub fn build<'a, I>(rules: I, limits: MergeLimits) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, V)>,
    {
        let mut set = Self::default();
        // flag prefix -> pending mergeable rules, in first-seen order
        let mut groups: Vec<(String, Vec<Pending<V>>)> = Vec::new();

        for (body, flags, value) in rules {
            let prefix = match inline_flags(flags) {
                Ok(prefix) => prefix,
                Err(e) => {
                    tracing::warn!(rule = %body, error = %e, "skipping regex rule");
                    continue;
                }
            };
            let scanned = RegexSource::scan(body);

            if scanned.has_backreference() {
                let source = format!("{}{}", prefix, anchor_sticky(scanned.isolated_source(), flags));
                set.push_single(source, value);
                continue;
            }

            let pending = Pending {
                source: anchor_sticky(scanned.engine_source(), flags),
                groups: scanned.group_count(),
                value,
            };
            match groups.iter_mut().find(|(p, _)| *p == prefix) {
                Some((_, list)) => list.push(pending),
                None => groups.push((prefix, vec![pending])),
            }
        }

        for (prefix, pending) in groups {
            set.merge(&prefix, pending, limits);
        }

        tracing::debug!(
            rules = set.rule_count,
            matchers = set.batches.len(),
            "compiled regex rules"
        );
        set
    }

    fn push_single(&mut self, source: String, value: V) {
        match Regex::new(&source) {
            Ok(regex) => {
                // single-member batches are attributed without a second regex
                let member = Member {
                    regex: OnceCell::new(),
                    source,
                    value,
                };
                self.batches.push(Batch {
                    regex,
                    members: vec![member],
                });
                self.rule_count += 1;
            }
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "skipping regex rule");
            }
        }
    }

    fn merge(&mut self, prefix: &str, pending: Vec<Pending<V>>, limits: MergeLimits) {
        let mut current: Vec<Pending<V>> = Vec::new();
        let mut current_groups = 0;
        let mut current_len = prefix.len();

        for rule in pending {
            let len = rule.source.len() + MEMBER_OVERHEAD;
            if !current.is_empty()
                && (current_groups + rule.groups > limits.max_groups
                    || current_len + len > limits.max_source_len)
            {
                self.seal(prefix, std::mem::take(&mut current));
                current_groups = 0;
                current_len = prefix.len();
            }
            current_groups += rule.groups;
            current_len += len;
            current.push(rule);
        }

        if !current.is_empty() {
            self.seal(prefix, current);
        }
    }

    /// Compile an alternation. If the engine refuses the combined source, the
    /// batch is halved until the offending rule stands alone and is dropped.
    fn seal(&mut self, prefix: &str, mut rules: Vec<Pending<V>>) {
        let alternation = rules
            .iter()
            .map(|r| format!("(?:{})", r.source))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&format!("{}{}", prefix, alternation)) {
            Ok(regex) => {
                self.rule_count += rules.len();
                let members = rules
                    .into_iter()
                    .map(|r| Member {
                        source: format!("{}{}", prefix, r.source),
                        regex: OnceCell::new(),
                        value: r.value,
                    })
                    .collect();
                self.batches.push(Batch { regex, members });
            }
            Err(e) if rules.len() == 1 => {
                tracing::warn!(source = %rules[0].source, error = %e, "skipping regex rule");
            }
            Err(_) => {
                let tail = rules.split_off(rules.len() / 2);
                self.seal(prefix, rules);
                self.seal(prefix, tail);
            }
        }
    }

    /// Check whether any rule matches somewhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.batches.iter().any(|batch| test(&batch.regex, text))
    }

    /// Find a rule matching somewhere in `text`.
    ///
    /// Merged matchers only say that some member matched; the members of the
    /// hit batch are then tested one by one to report which.
    pub fn find(&self, text: &str) -> Option<&V> {
        for batch in &self.batches {
            if !test(&batch.regex, text) {
                continue;
            }
            if let [single] = batch.members.as_slice() {
                return Some(&single.value);
            }
            if let Some(member) = batch.members.iter().find(|m| m.is_match(text)) {
                return Some(&member.value);
            }
        }
        None
    }

    /// Number of compiled matchers.
    pub fn matcher_count(&self) -> usize {
        self.batches.len()
    }

    /// Number of rules that compiled.
    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }
}
