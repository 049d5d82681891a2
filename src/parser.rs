use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::idn::IdnNormalizer;
use crate::transform::TransformRules;
use crate::types::{is_regex_rule, ParsedRule};
use crate::validate::{validate_rule, SCHEME};

/// Line terminators accepted in rule text: `\n`, `\r\n` or a lone `\r`.
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n|\r\n?").expect("LINE_BREAK: hardcoded regex is invalid"));

/// When to run a rule through the transform list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformMode {
    /// Never transform
    None,
    /// Transform unless the rule is a regex rule
    Standard,
    /// Transform only absolute URLs (rules with a scheme)
    Url,
    /// Always transform
    #[default]
    Always,
}

/// How to validate a rule after transforming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidateMode {
    /// Keep the rule text as is
    #[default]
    None,
    /// Replace the rule with its canonical form
    Standard,
    /// Keep the rule only if it already is in canonical form
    Strict,
}

/// Options for [`parse_rule_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub transform: TransformMode,
    pub validate: ValidateMode,
}

impl ParseOptions {
    pub fn new(transform: TransformMode, validate: ValidateMode) -> Self {
        Self {
            transform,
            validate,
        }
    }
}

/// Split rule text into lines.
pub fn get_lines(text: &str) -> impl Iterator<Item = &str> {
    LINE_BREAK.split(text)
}

/// Split off the leading non-whitespace field and the whitespace after it.
fn split_field(text: &str) -> (&str, &str, &str) {
    let field_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (field, rest) = text.split_at(field_end);
    let sep_end = rest
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(rest.len());
    let (sep, rest) = rest.split_at(sep_end);
    (field, sep, rest)
}

/// Split a rule line into `(rule, separator, comment)`.
pub fn split_rule_line(line: &str) -> (&str, &str, &str) {
    split_field(line)
}

fn apply_validation(rule: String, mode: ValidateMode, idn: &dyn IdnNormalizer) -> String {
    match mode {
        ValidateMode::None => rule,
        ValidateMode::Standard => validate_rule(&rule, idn),
        ValidateMode::Strict => {
            let canonical = validate_rule(&rule, idn);
            if canonical == rule {
                canonical
            } else {
                String::new()
            }
        }
    }
}

/// Parse one rule line, transforming and validating the rule as requested.
pub fn parse_rule_line(
    line: &str,
    options: ParseOptions,
    transforms: &TransformRules,
    idn: &dyn IdnNormalizer,
) -> ParsedRule {
    let (rule, separator, comment) = split_rule_line(line);

    let transform = match options.transform {
        TransformMode::None => false,
        TransformMode::Standard => !is_regex_rule(rule),
        TransformMode::Url => !is_regex_rule(rule) && SCHEME.is_match(rule),
        TransformMode::Always => true,
    };
    let rule = if transform {
        transforms.apply(rule)
    } else {
        rule.to_string()
    };

    ParsedRule {
        rule: apply_validation(rule, options.validate, idn),
        separator: separator.to_string(),
        comment: comment.to_string(),
        source: None,
    }
}

/// Normalize a block of rule text line by line.
///
/// Separators and comments are kept; invalid rules leave only their comment.
pub fn validate_rules_text(
    text: &str,
    options: ParseOptions,
    transforms: &TransformRules,
    idn: &dyn IdnNormalizer,
) -> String {
    get_lines(text)
        .map(|line| parse_rule_line(line, options, transforms, idn).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A parsed transform line: `pattern sep replace sep2 comment`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformRuleLine {
    pub pattern: String,
    pub separator: String,
    pub replace: String,
    pub separator2: String,
    pub comment: String,
}

impl fmt::Display for TransformRuleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.pattern, self.separator, self.replace, self.separator2, self.comment
        )
    }
}

/// Split a transform line into its fields.
pub fn parse_transform_rule_line(line: &str) -> TransformRuleLine {
    let (pattern, separator, rest) = split_field(line);
    let (replace, separator2, comment) = split_field(rest);
    TransformRuleLine {
        pattern: pattern.to_string(),
        separator: separator.to_string(),
        replace: replace.to_string(),
        separator2: separator2.to_string(),
        comment: comment.to_string(),
    }
}

/// Split a transform line and validate its pattern.
pub fn validate_transform_rule_line(
    line: &str,
    mode: ValidateMode,
    idn: &dyn IdnNormalizer,
) -> TransformRuleLine {
    let mut parsed = parse_transform_rule_line(line);
    parsed.pattern = apply_validation(std::mem::take(&mut parsed.pattern), mode, idn);
    parsed
}

/// Normalize a block of transform rule text line by line.
pub fn validate_transform_rules_text(
    text: &str,
    mode: ValidateMode,
    idn: &dyn IdnNormalizer,
) -> String {
    get_lines(text)
        .map(|line| validate_transform_rule_line(line, mode, idn).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a list of web list URLs.
///
/// Anything from the first whitespace or `#` on a line is a comment; blank
/// lines are dropped.
pub fn urls_text_to_lines(text: &str) -> Vec<String> {
    get_lines(text)
        .map(|line| {
            let end = line
                .find(|c: char| c == '#' || c.is_whitespace())
                .unwrap_or(line.len());
            &line[..end]
        })
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
