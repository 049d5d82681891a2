//! Lexical analysis of regex rule bodies.
//!
//! Rule bodies are written in the delimited `/expr/flags` style. Before a body
//! is handed to the regex engine we need to know how many capturing groups it
//! declares and whether it contains backreferences, and for backreference
//! bearing bodies we rewrite unreferenced capturing groups as non-capturing.

use std::collections::HashSet;
use std::ops::Range;

use fancy_regex::Regex;

use crate::error::{FilterError, Result};

#[derive(Debug, Clone)]
enum Token {
    /// Opening of a capturing group: `(`, `(?<name>` or `(?P<name>`
    Group {
        range: Range<usize>,
        index: usize,
        name: Option<String>,
    },
    /// `\N`
    IndexRef { range: Range<usize>, index: usize },
    /// `\k<name>`
    NameRef { range: Range<usize>, name: String },
    /// `\/`, a delimiter escape with no meaning to the engine
    Slash { range: Range<usize> },
}

/// A scanned regex rule body.
#[derive(Debug, Clone)]
pub struct RegexSource<'a> {
    body: &'a str,
    tokens: Vec<Token>,
    group_count: usize,
}

impl<'a> RegexSource<'a> {
    /// Scan a rule body.
    pub fn scan(body: &'a str) -> Self {
        let bytes = body.as_bytes();
        let mut tokens = Vec::new();
        let mut group_count = 0;
        let mut in_class = false;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => {
                    let Some(next) = body[i + 1..].chars().next() else {
                        i += 1;
                        continue;
                    };
                    if !in_class && matches!(next, '1'..='9') {
                        let end = i
                            + 1
                            + body[i + 1..]
                                .bytes()
                                .take_while(u8::is_ascii_digit)
                                .count();
                        if let Ok(index) = body[i + 1..end].parse() {
                            tokens.push(Token::IndexRef {
                                range: i..end,
                                index,
                            });
                        }
                        i = end;
                        continue;
                    }
                    if !in_class && body[i + 1..].starts_with("k<") {
                        if let Some(close) = body[i + 3..].find('>') {
                            let end = i + 3 + close + 1;
                            tokens.push(Token::NameRef {
                                range: i..end,
                                name: body[i + 3..end - 1].to_string(),
                            });
                            i = end;
                            continue;
                        }
                    }
                    if next == '/' {
                        tokens.push(Token::Slash { range: i..i + 2 });
                    }
                    i += 1 + next.len_utf8();
                }
                b'[' if !in_class => {
                    in_class = true;
                    i += 1;
                }
                b']' if in_class => {
                    in_class = false;
                    i += 1;
                }
                b'(' if !in_class => {
                    let rest = &body[i + 1..];
                    let name_start = if rest.starts_with("?P<") {
                        Some(i + 4)
                    } else if rest.starts_with("?<")
                        && !rest.starts_with("?<=")
                        && !rest.starts_with("?<!")
                    {
                        Some(i + 3)
                    } else {
                        None
                    };

                    match name_start {
                        Some(start) => match body[start..].find('>') {
                            Some(close) => {
                                group_count += 1;
                                tokens.push(Token::Group {
                                    range: i..start + close + 1,
                                    index: group_count,
                                    name: Some(body[start..start + close].to_string()),
                                });
                                i = start + close + 1;
                            }
                            None => i += 1,
                        },
                        None if rest.starts_with('?') => i += 1,
                        None => {
                            group_count += 1;
                            tokens.push(Token::Group {
                                range: i..i + 1,
                                index: group_count,
                                name: None,
                            });
                            i += 1;
                        }
                    }
                }
                _ => i += 1,
            }
        }

        Self {
            body,
            tokens,
            group_count,
        }
    }

    /// The original body.
    pub fn body(&self) -> &'a str {
        self.body
    }

    /// Number of capturing groups declared.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    fn is_valid_ref(&self, token: &Token) -> bool {
        match token {
            Token::IndexRef { index, .. } => *index >= 1 && *index <= self.group_count,
            Token::NameRef { name, .. } => self.tokens.iter().any(
                |t| matches!(t, Token::Group { name: Some(n), .. } if n == name),
            ),
            _ => false,
        }
    }

    /// Whether the body refers back to one of its own groups.
    pub fn has_backreference(&self) -> bool {
        self.tokens.iter().any(|t| self.is_valid_ref(t))
    }

    /// Body with delimiter escapes removed, ready for the engine.
    pub fn engine_source(&self) -> String {
        self.rewrite(|_| None)
    }

    /// Body with every capturing group that no backreference points at turned
    /// into a non-capturing group, and backreferences renumbered to match.
    pub fn isolated_source(&self) -> String {
        let mut referenced: HashSet<usize> = HashSet::new();
        for token in &self.tokens {
            if !self.is_valid_ref(token) {
                continue;
            }
            match token {
                Token::IndexRef { index, .. } => {
                    referenced.insert(*index);
                }
                Token::NameRef { name, .. } => {
                    for t in &self.tokens {
                        if let Token::Group {
                            index, name: Some(n), ..
                        } = t
                        {
                            if n == name {
                                referenced.insert(*index);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // old index -> new index for the groups that stay capturing
        let mut renumber = vec![0usize; self.group_count + 1];
        let mut next = 0;
        for index in 1..=self.group_count {
            if referenced.contains(&index) {
                next += 1;
                renumber[index] = next;
            }
        }

        self.rewrite(|token| match token {
            Token::Group { index, .. } if renumber[*index] == 0 => Some("(?:".to_string()),
            Token::IndexRef { index, .. } if self.is_valid_ref(token) => {
                Some(format!("\\{}", renumber[*index]))
            }
            _ => None,
        })
    }

    fn rewrite(&self, mut replace: impl FnMut(&Token) -> Option<String>) -> String {
        let mut out = String::with_capacity(self.body.len());
        let mut last = 0;
        for token in &self.tokens {
            let (range, replacement) = match token {
                Token::Slash { range } => (range, Some("/".to_string())),
                Token::Group { range, .. }
                | Token::IndexRef { range, .. }
                | Token::NameRef { range, .. } => (range, replace(token)),
            };
            if let Some(replacement) = replacement {
                out.push_str(&self.body[last..range.start]);
                out.push_str(&replacement);
                last = range.end;
            }
        }
        out.push_str(&self.body[last..]);
        out
    }
}

/// Translate rule flags into an inline flag group.
///
/// `i`, `m` and `s` change matching. `d`, `g`, `u` and `v` are accepted and
/// have no effect on a single test; `y` is handled by [`anchor_sticky`].
/// Anything else is an error.
pub fn inline_flags(flags: &str) -> Result<String> {
    let mut effective = String::new();
    for flag in ['i', 'm', 's'] {
        if flags.contains(flag) {
            effective.push(flag);
        }
    }
    if let Some(bad) = flags
        .chars()
        .find(|c| !matches!(c, 'd' | 'g' | 'i' | 'm' | 's' | 'u' | 'v' | 'y'))
    {
        return Err(FilterError::InvalidRegex {
            pattern: flags.to_string(),
            message: format!("invalid flag '{}'", bad),
        });
    }
    if effective.is_empty() {
        Ok(effective)
    } else {
        Ok(format!("(?{})", effective))
    }
}

/// A sticky (`y`) rule is tested from the start of the input only.
pub fn anchor_sticky(source: String, flags: &str) -> String {
    if flags.contains('y') {
        format!(r"\A(?:{})", source)
    } else {
        source
    }
}

/// Compile a rule body with its flags as a standalone regex.
pub fn compile_rule_regex(body: &str, flags: &str) -> Result<Regex> {
    let prefix = inline_flags(flags)?;
    let source = anchor_sticky(RegexSource::scan(body).engine_source(), flags);
    Regex::new(&format!("{}{}", prefix, source)).map_err(|e| FilterError::InvalidRegex {
        pattern: body.to_string(),
        message: e.to_string(),
    })
}
