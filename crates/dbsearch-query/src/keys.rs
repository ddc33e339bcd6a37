//! Keyword expression trees.
//!
//! Search keys arrive as a tree of words and groups. Before compilation the
//! tree is prepared: phrases are split into words, words are normalized the
//! way the indexer stores them, too-short words are set aside as ignored,
//! duplicates are dropped (first occurrence wins), and redundant nesting is
//! flattened away.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use dbsearch_fts::indexer::normalize_word;
use dbsearch_fts::mapper::split_words;

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conjunction {
    /// Every child must match.
    #[default]
    And,
    /// Any child may match.
    Or,
}

/// A keyword expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keys {
    /// A word or phrase.
    Word(String),
    /// A nested group.
    Group(KeyGroup),
}

/// A group of keyword expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGroup {
    /// How the children combine.
    #[serde(default)]
    pub conjunction: Conjunction,
    /// Whether the group as a whole is negated.
    #[serde(default)]
    pub negated: bool,
    /// Children.
    pub children: Vec<Keys>,
}

impl Keys {
    /// A single word or phrase.
    pub fn word(word: impl Into<String>) -> Self {
        Keys::Word(word.into())
    }

    /// All children must match.
    pub fn and(children: Vec<Keys>) -> Self {
        Keys::Group(KeyGroup {
            conjunction: Conjunction::And,
            negated: false,
            children,
        })
    }

    /// Any child may match.
    pub fn or(children: Vec<Keys>) -> Self {
        Keys::Group(KeyGroup {
            conjunction: Conjunction::Or,
            negated: false,
            children,
        })
    }

    /// Negates the expression.
    pub fn not(self) -> Self {
        match self {
            Keys::Group(mut group) => {
                group.negated = !group.negated;
                Keys::Group(group)
            }
            word => Keys::Group(KeyGroup {
                conjunction: Conjunction::And,
                negated: true,
                children: vec![word],
            }),
        }
    }

    /// Whether this is a negated group.
    pub fn is_negated(&self) -> bool {
        matches!(self, Keys::Group(g) if g.negated)
    }

    /// Parses a search string.
    ///
    /// Terms are ANDed. `-term` negates a term, `"a b"` is a phrase, and a
    /// bare `OR` separates alternatives. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Keys> {
        let mut alternatives: Vec<Vec<Keys>> = vec![Vec::new()];
        for term in lex(input) {
            match term {
                Term::Or => alternatives.push(Vec::new()),
                Term::Word { text, negated } => {
                    let key = Keys::Word(text);
                    let key = if negated { key.not() } else { key };
                    if let Some(current) = alternatives.last_mut() {
                        current.push(key);
                    }
                }
            }
        }
        let mut groups: Vec<Keys> = alternatives
            .into_iter()
            .filter(|terms| !terms.is_empty())
            .map(|mut terms| {
                if terms.len() == 1 && !terms[0].is_negated() {
                    terms.remove(0)
                } else {
                    Keys::and(terms)
                }
            })
            .collect();
        match groups.len() {
            0 => None,
            1 => groups.pop(),
            _ => Some(Keys::or(groups)),
        }
    }

    /// Every word of the tree, in order, including negated ones.
    pub fn words(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_words(&mut out);
        out
    }

    fn collect_words<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Keys::Word(w) => out.push(w),
            Keys::Group(g) => g.children.iter().for_each(|c| c.collect_words(out)),
        }
    }
}

enum Term {
    Word { text: String, negated: bool },
    Or,
}

fn lex(input: &str) -> Vec<Term> {
    let mut terms = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let negated = c == '-';
        if negated {
            chars.next();
        }
        let mut text = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                text.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                text.push(c);
                chars.next();
            }
        }
        if text.is_empty() {
            continue;
        }
        if text == "OR" && !negated {
            terms.push(Term::Or);
        } else {
            terms.push(Term::Word { text, negated });
        }
    }
    terms
}

/// A prepared keyword tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedKeys {
    /// What is left to compile; `None` means no fulltext filter.
    pub keys: Option<Keys>,
    /// Words dropped for being shorter than the minimum length.
    pub ignored: Vec<String>,
}

impl PreparedKeys {
    /// True when keys were given but every one of them was ignored.
    pub fn all_ignored(&self) -> bool {
        self.keys.is_none() && !self.ignored.is_empty()
    }
}

/// Prepares a keyword tree for compilation.
///
/// The result's root is never a negated group: a negated root is wrapped in
/// an AND group of its own.
pub fn prepare_keys(keys: &Keys, min_chars: usize) -> PreparedKeys {
    let mut prep = Preparer {
        min_chars,
        seen: HashSet::new(),
        ignored: Vec::new(),
    };
    let keys = prep.prepare(keys).map(|root| {
        if root.is_negated() {
            Keys::and(vec![root])
        } else {
            root
        }
    });
    PreparedKeys {
        keys,
        ignored: prep.ignored,
    }
}

struct Preparer {
    min_chars: usize,
    seen: HashSet<String>,
    ignored: Vec<String>,
}

impl Preparer {
    fn prepare(&mut self, keys: &Keys) -> Option<Keys> {
        match keys {
            Keys::Word(text) => {
                let mut words = Vec::new();
                for piece in split_words(text) {
                    match normalize_word(piece, self.min_chars) {
                        Some(word) => {
                            if self.seen.insert(word.clone()) {
                                words.push(Keys::Word(word));
                            }
                        }
                        None => self.ignored.push(piece.to_string()),
                    }
                }
                match words.len() {
                    0 => None,
                    1 => words.pop(),
                    _ => Some(Keys::and(words)),
                }
            }
            Keys::Group(group) => {
                let mut children = Vec::with_capacity(group.children.len());
                for child in group.children.iter().filter_map(|c| self.prepare(c)) {
                    match child {
                        Keys::Group(nested)
                            if !nested.negated && nested.conjunction == group.conjunction =>
                        {
                            children.extend(nested.children);
                        }
                        other => children.push(other),
                    }
                }
                collapse(group.conjunction, group.negated, children)
            }
        }
    }
}

fn collapse(conjunction: Conjunction, negated: bool, mut children: Vec<Keys>) -> Option<Keys> {
    if children.len() > 1 {
        return Some(Keys::Group(KeyGroup {
            conjunction,
            negated,
            children,
        }));
    }
    let only = children.pop()?;
    if !negated {
        return Some(only);
    }
    Some(match only {
        Keys::Group(group) => Keys::Group(KeyGroup {
            negated: !group.negated,
            ..group
        }),
        word => Keys::Group(KeyGroup {
            conjunction,
            negated: true,
            children: vec![word],
        }),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn w(s: &str) -> Keys {
        Keys::word(s)
    }

    // ========================================================================
    // Parsing tests
    // ========================================================================

    #[test]
    fn test_parse_single_word() {
        assert_eq!(Keys::parse("car"), Some(w("car")));
        assert_eq!(Keys::parse("   "), None);
    }

    #[test]
    fn test_parse_terms_are_anded() {
        assert_eq!(Keys::parse("red car"), Some(Keys::and(vec![w("red"), w("car")])));
    }

    #[test]
    fn test_parse_negation_and_phrase() {
        assert_eq!(
            Keys::parse("car -\"blue paint\""),
            Some(Keys::and(vec![w("car"), w("blue paint").not()]))
        );
        assert_eq!(Keys::parse("-blue"), Some(Keys::and(vec![w("blue").not()])));
    }

    #[test]
    fn test_parse_or() {
        assert_eq!(
            Keys::parse("red car OR blue"),
            Some(Keys::or(vec![
                Keys::and(vec![w("red"), w("car")]),
                w("blue")
            ]))
        );
    }

    #[test]
    fn test_deserialize_tree() {
        let keys: Keys = serde_json::from_str(
            r#"{"conjunction": "OR", "children": ["red", {"negated": true, "children": ["blue"]}]}"#,
        )
        .unwrap();
        assert_eq!(keys, Keys::or(vec![w("red"), w("blue").not()]));
    }

    // ========================================================================
    // Preparation tests
    // ========================================================================

    #[test]
    fn test_prepare_splits_and_lowercases() {
        let prepared = prepare_keys(&w("Red Car"), 1);
        assert_eq!(prepared.keys, Some(Keys::and(vec![w("red"), w("car")])));
        assert!(prepared.ignored.is_empty());
    }

    #[test]
    fn test_prepare_ignores_short_words() {
        let prepared = prepare_keys(&w("a car of 12"), 3);
        assert_eq!(prepared.keys, Some(Keys::and(vec![w("car"), w("12")])));
        assert_eq!(prepared.ignored, vec!["a".to_string(), "of".to_string()]);
    }

    #[test]
    fn test_prepare_all_ignored() {
        let prepared = prepare_keys(&w("a b"), 3);
        assert!(prepared.keys.is_none());
        assert!(prepared.all_ignored());
    }

    #[test]
    fn test_prepare_trims_numbers() {
        let prepared = prepare_keys(&w("007"), 1);
        assert_eq!(prepared.keys, Some(w("7")));
    }

    #[test]
    fn test_prepare_removes_duplicates_across_tree() {
        let keys = Keys::or(vec![
            Keys::and(vec![w("red"), w("car")]),
            Keys::and(vec![w("RED"), w("bike")]),
        ]);
        let prepared = prepare_keys(&keys, 1);
        assert_eq!(
            prepared.keys,
            Some(Keys::or(vec![Keys::and(vec![w("red"), w("car")]), w("bike")]))
        );
    }

    #[test]
    fn test_prepare_flattens_same_conjunction() {
        let keys = Keys::and(vec![w("a"), Keys::and(vec![w("b"), w("c")])]);
        let prepared = prepare_keys(&keys, 1);
        assert_eq!(prepared.keys, Some(Keys::and(vec![w("a"), w("b"), w("c")])));
    }

    #[test]
    fn test_prepare_keeps_negated_nesting() {
        let keys = Keys::and(vec![w("a"), Keys::and(vec![w("b"), w("c")]).not()]);
        let prepared = prepare_keys(&keys, 1);
        assert_eq!(prepared.keys, Some(keys));
    }

    #[test]
    fn test_prepare_collapses_single_children() {
        let keys = Keys::or(vec![Keys::and(vec![w("only")])]);
        assert_eq!(prepare_keys(&keys, 1).keys, Some(w("only")));
        let empty = Keys::and(vec![Keys::or(vec![])]);
        assert_eq!(prepare_keys(&empty, 1).keys, None);
    }

    #[test]
    fn test_prepare_double_negation() {
        let keys = Keys::and(vec![w("a"), Keys::and(vec![Keys::or(vec![w("b"), w("c")]).not()]).not()]);
        let prepared = prepare_keys(&keys, 1);
        assert_eq!(
            prepared.keys,
            Some(Keys::and(vec![w("a"), Keys::or(vec![w("b"), w("c")])]))
        );
    }

    #[test]
    fn test_prepare_wraps_negated_root() {
        let prepared = prepare_keys(&w("blue").not(), 1);
        assert_eq!(prepared.keys, Some(Keys::and(vec![w("blue").not()])));
    }

    #[test]
    fn test_words_lists_all_leaves() {
        let keys = Keys::and(vec![w("a"), Keys::or(vec![w("b"), w("c").not()])]);
        assert_eq!(keys.words(), vec!["a", "b", "c"]);
    }
}
