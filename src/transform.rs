//! Rule rewriting.
//!
//! A transform rule is a `(pattern, replace)` pair. Candidate rule text is
//! run through the list in order and the first matching pattern rewrites it:
//! the matched span is replaced by the template, with `$`-placeholders
//! expanded as in ordinary search-and-replace.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

use crate::error::{FilterError, Result};
use crate::matcher::compile_rule_regex;
use crate::parser::{get_lines, parse_transform_rule_line};
use crate::types::{is_regex_rule, RuleKind};

/// `$$`, `$&`, `` $` ``, `$'` or `$` followed by digits.
static PLACEHOLDER: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"\$([$&`']|\d+)").expect("PLACEHOLDER: hardcoded regex is invalid")
});

/// What a glob `*` may span inside a transform pattern.
const GLOB_ANY: &str = "[^:/?#]*";

/// Escape the characters that are special in a regex rule body.
///
/// `-` and `/` are left alone, so the result reads naturally inside a
/// `/.../` rule.
pub fn escape_regex_simple(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '*' | '+' | '?' | '.' | '|' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Translate a transform glob into a regex source.
fn glob_to_regex(glob: &str) -> String {
    regex::escape(glob).replace(r"\*", GLOB_ANY)
}

/// A single rewrite rule.
#[derive(Debug, Clone)]
pub struct TransformRule {
    pattern: Regex,
    replace: String,
    /// Inserted text is regex-escaped when the template is a regex rule
    escape_inserts: bool,
}

impl TransformRule {
    /// Create a rule from a pattern and a replacement template.
    ///
    /// `pattern` is either a `/expr/flags` regex rule or a glob where `*`
    /// matches within one URL component.
    pub fn new(pattern: &str, replace: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(FilterError::InvalidRule(
                "transform pattern is empty".to_string(),
            ));
        }
        let regex = match RuleKind::classify(pattern) {
            RuleKind::Regex { body, flags } => compile_rule_regex(body, flags)?,
            RuleKind::Glob(glob) => {
                let source = glob_to_regex(glob);
                Regex::new(&source).map_err(|e| FilterError::InvalidRegex {
                    pattern: source,
                    message: e.to_string(),
                })?
            }
        };
        Ok(Self {
            pattern: regex,
            replace: replace.to_string(),
            escape_inserts: is_regex_rule(replace),
        })
    }

    pub fn replace(&self) -> &str {
        &self.replace
    }

    /// Rewrite the first match of the pattern in `input`, if any.
    pub fn apply(&self, input: &str) -> Option<String> {
        let caps = match self.pattern.captures(input) {
            Ok(Some(caps)) => caps,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(input, error = %e, "transform pattern evaluation aborted");
                return None;
            }
        };
        let whole = caps.get(0)?;
        let before = &input[..whole.start()];
        let after = &input[whole.end()..];

        let expanded = PLACEHOLDER.replace_all(&self.replace, |ph: &regex::Captures<'_>| {
            let token = &ph[1];
            let inserted = match token {
                "$" => return "$".to_string(),
                "&" => whole.as_str().to_string(),
                "`" => before.to_string(),
                "'" => after.to_string(),
                digits => {
                    // longest prefix naming an existing group wins; the
                    // remaining digits are literal
                    let mut index = digits;
                    let mut resolved = None;
                    while !index.is_empty() {
                        if let Ok(n) = index.parse::<usize>() {
                            if n > 0 && n < caps.len() {
                                let group = caps.get(n).map_or("", |m| m.as_str());
                                resolved = Some(format!("{}{}", group, &digits[index.len()..]));
                                break;
                            }
                        }
                        index = &index[..index.len() - 1];
                    }
                    match resolved {
                        Some(text) => text,
                        None => return format!("${}", digits),
                    }
                }
            };
            if self.escape_inserts {
                escape_regex_simple(&inserted)
            } else {
                inserted
            }
        });
        Some(format!("{}{}{}", before, expanded, after))
    }
}

/// Ordered list of transform rules.
#[derive(Debug, Clone, Default)]
pub struct TransformRules {
    rules: Vec<TransformRule>,
}

impl TransformRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a block of transform lines and append them in order.
    ///
    /// Lines lacking a pattern or a replacement are ignored, as are lines
    /// whose pattern does not compile. Returns the number of rules added.
    pub fn add_rules_text(&mut self, text: &str) -> usize {
        let mut added = 0;
        for line in get_lines(text) {
            let parsed = parse_transform_rule_line(line);
            if parsed.pattern.is_empty() || parsed.replace.is_empty() {
                continue;
            }
            match TransformRule::new(&parsed.pattern, &parsed.replace) {
                Ok(rule) => {
                    self.rules.push(rule);
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(line, error = %e, "skipping transform rule");
                }
            }
        }
        added
    }

    pub fn push(&mut self, rule: TransformRule) {
        self.rules.push(rule);
    }

    /// Rewrite `rule` with the first matching transform.
    pub fn apply(&self, rule: &str) -> String {
        for transform in &self.rules {
            if let Some(rewritten) = transform.apply(rule) {
                return rewritten;
            }
        }
        rule.to_string()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
