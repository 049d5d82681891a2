//! Shared-prefix trie over wildcard patterns.
//!
//! Every pattern is a string of literal characters and `*`, where `*`
//! matches any run of characters (including none). Patterns are inserted
//! character by character; `*` becomes a dedicated wildcard edge and the end
//! of a pattern is a terminal edge holding the values registered for it.
//!
//! Matching runs the trie as a non-deterministic automaton with an explicit
//! work list. Each `(node, position)` state is visited at most once, so the
//! cost is bounded by `nodes * input length` even for inputs built to make a
//! backtracking matcher explode.

use std::collections::{HashMap, HashSet};

/// Trie edge label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Token {
    Char(char),
    AnyChars,
    End,
}

impl Token {
    fn from_char(c: char) -> Self {
        if c == '*' {
            Token::AnyChars
        } else {
            Token::Char(c)
        }
    }
}

#[derive(Debug, Clone)]
struct Terminal<V> {
    pattern: String,
    values: Vec<V>,
}

#[derive(Debug, Clone)]
struct Node<V> {
    /// Label of the edge leading here; `None` for the root
    token: Option<Token>,
    children: HashMap<Token, usize>,
    terminal: Option<Terminal<V>>,
}

impl<V> Node<V> {
    fn new(token: Option<Token>) -> Self {
        Self {
            token,
            children: HashMap::new(),
            terminal: None,
        }
    }
}

/// A successful trie match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobMatch<'a, V> {
    /// The stored pattern that matched
    pub pattern: &'a str,
    /// The first value registered for that pattern
    pub value: &'a V,
}

/// Wildcard pattern trie.
#[derive(Debug, Clone)]
pub struct GlobTrie<V> {
    /// Arena of nodes; index 0 is the root
    nodes: Vec<Node<V>>,
    pattern_count: usize,
}

const ROOT: usize = 0;

impl<V> Default for GlobTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> GlobTrie<V> {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None)],
            pattern_count: 0,
        }
    }

    fn child_or_insert(&mut self, parent: usize, token: Token) -> usize {
        if let Some(&id) = self.nodes[parent].children.get(&token) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::new(Some(token)));
        self.nodes[parent].children.insert(token, id);
        id
    }

    /// Register `value` for `pattern`. A value already registered for the
    /// same pattern is not added twice.
    pub fn insert(&mut self, pattern: &str, value: V)
    where
        V: PartialEq,
    {
        let mut node = ROOT;
        for c in pattern.chars() {
            node = self.child_or_insert(node, Token::from_char(c));
        }
        let end = self.child_or_insert(node, Token::End);

        let terminal = self.nodes[end].terminal.get_or_insert_with(|| Terminal {
            pattern: pattern.to_string(),
            values: Vec::new(),
        });
        if terminal.values.is_empty() {
            self.pattern_count += 1;
        }
        if !terminal.values.contains(&value) {
            terminal.values.push(value);
        }
    }

    /// Find a stored pattern matching the whole input.
    ///
    /// When several patterns match, which one is reported is unspecified.
    pub fn find(&self, input: &str) -> Option<GlobMatch<'_, V>> {
        let parts: Vec<Token> = input
            .chars()
            .map(Token::Char)
            .chain(std::iter::once(Token::End))
            .collect();

        let mut stack = vec![(ROOT, 0usize)];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();

        while let Some((id, pos)) = stack.pop() {
            if !seen.insert((id, pos)) {
                continue;
            }
            let node = &self.nodes[id];

            if node.token == Some(Token::End) {
                if let Some(terminal) = &node.terminal {
                    if let Some(value) = terminal.values.first() {
                        return Some(GlobMatch {
                            pattern: &terminal.pattern,
                            value,
                        });
                    }
                }
                continue;
            }

            let part = parts[pos];
            let mut next: [Option<(usize, usize)>; 3] = [None; 3];

            // consume the current input token on a matching edge
            if let Some(&child) = node.children.get(&part) {
                next[0] = Some((child, pos + 1));
            }
            // stay on the wildcard and swallow one more character
            if node.token == Some(Token::AnyChars) && part != Token::End {
                next[1] = Some((id, pos + 1));
            }
            // enter a wildcard without consuming anything
            if let Some(&child) = node.children.get(&Token::AnyChars) {
                next[2] = Some((child, pos));
            }

            // reversed so the first candidate is explored first
            stack.extend(next.iter().rev().flatten().copied());
        }

        None
    }

    /// Check whether any stored pattern matches the whole input.
    pub fn matches(&self, input: &str) -> bool {
        self.find(input).is_some()
    }

    /// Number of distinct patterns stored.
    pub fn len(&self) -> usize {
        self.pattern_count
    }

    pub fn is_empty(&self) -> bool {
        self.pattern_count == 0
    }
}
