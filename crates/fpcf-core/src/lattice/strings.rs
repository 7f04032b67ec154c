//! String constancy lattice
//!
//! Values describe the set of strings a program location may hold, using a
//! small regex-like tree:
//! - `Const("abc")` is a fully known fragment
//! - `Dynamic` is an arbitrary fragment, rendered `.*`
//! - `Concat`, `Or` and `Repeat` compose fragments, rendered as juxtaposition,
//!   `(a|b)` and `(a)*`
//!
//! Ordering: `NoFlow ≤ Constant ≤ PartiallyConstant ≤ Dynamic` by level, and
//! within a level by language coverage (approximated on expanded
//! alternatives, where `(x)*` expands to the empty string, one `x`, or the
//! repetition itself). Trees are kept canonical: nested concatenations and
//! alternations are flattened, alternatives are sorted, deduplicated, and
//! pruned when another alternative already covers them.

use super::{Lattice, PropertyValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on expanded alternatives before coverage checks give up
const EXPANSION_LIMIT: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StringTree {
    Const(String),
    Dynamic,
    Concat(Vec<StringTree>),
    Or(Vec<StringTree>),
    Repeat(Box<StringTree>),
}

impl StringTree {
    pub fn constant(value: impl Into<String>) -> Self {
        StringTree::Const(value.into())
    }

    /// Normalized concatenation
    pub fn concat(parts: impl IntoIterator<Item = StringTree>) -> Self {
        let mut flat: Vec<StringTree> = Vec::new();
        for part in parts {
            match part {
                StringTree::Concat(children) => {
                    for child in children {
                        push_concat_part(&mut flat, child);
                    }
                }
                other => push_concat_part(&mut flat, other),
            }
        }
        match flat.len() {
            0 => StringTree::Const(String::new()),
            1 => flat.remove(0),
            _ => StringTree::Concat(flat),
        }
    }

    /// Normalized alternation; an empty input yields the empty string
    pub fn or(alternatives: impl IntoIterator<Item = StringTree>) -> Self {
        let mut flat: Vec<StringTree> = Vec::new();
        for alternative in alternatives {
            match alternative {
                StringTree::Or(children) => flat.extend(children),
                StringTree::Dynamic => return StringTree::Dynamic,
                other => flat.push(other),
            }
        }
        flat.sort();
        flat.dedup();

        let covered: Vec<bool> = (0..flat.len())
            .map(|i| {
                (0..flat.len()).any(|j| {
                    i != j
                        && flat[i].is_covered_by(&flat[j])
                        && (j < i || !flat[j].is_covered_by(&flat[i]))
                })
            })
            .collect();
        let mut kept: Vec<StringTree> = flat
            .into_iter()
            .zip(covered)
            .filter_map(|(tree, covered)| (!covered).then_some(tree))
            .collect();

        match kept.len() {
            0 => StringTree::Const(String::new()),
            1 => kept.remove(0),
            _ => StringTree::Or(kept),
        }
    }

    /// Zero or more repetitions
    pub fn repeat(tree: StringTree) -> Self {
        match tree {
            StringTree::Dynamic => StringTree::Dynamic,
            repeated @ StringTree::Repeat(_) => repeated,
            other => StringTree::Repeat(Box::new(other)),
        }
    }

    /// Regex-like rendering
    pub fn pattern(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            StringTree::Const(value) => out.push_str(value),
            StringTree::Dynamic => out.push_str(".*"),
            StringTree::Concat(parts) => parts.iter().for_each(|part| part.render(out)),
            StringTree::Or(alternatives) => {
                out.push('(');
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    alternative.render(out);
                }
                out.push(')');
            }
            StringTree::Repeat(inner) => {
                out.push('(');
                inner.render(out);
                out.push_str(")*");
            }
        }
    }

    /// Node count plus literal length
    pub fn size(&self) -> usize {
        match self {
            StringTree::Const(value) => 1 + value.chars().count(),
            StringTree::Dynamic => 1,
            StringTree::Concat(children) | StringTree::Or(children) => {
                1 + children.iter().map(StringTree::size).sum::<usize>()
            }
            StringTree::Repeat(inner) => 1 + inner.size(),
        }
    }

    /// Number of top-level alternatives
    pub fn alternatives(&self) -> usize {
        match self {
            StringTree::Or(alternatives) => alternatives.len(),
            _ => 1,
        }
    }

    /// Whether the tree contains any fully known fragment
    pub fn has_constant_part(&self) -> bool {
        match self {
            StringTree::Const(_) => true,
            StringTree::Dynamic => false,
            StringTree::Concat(children) | StringTree::Or(children) => {
                children.iter().any(StringTree::has_constant_part)
            }
            StringTree::Repeat(inner) => inner.has_constant_part(),
        }
    }

    /// Every string described by `self` is also described by `other`
    ///
    /// Decided on expanded alternatives, where `.*` in `other` may stand for
    /// any run of fragments and `(y)*` covers `(x)*` when `y` covers `x`.
    /// When expansion exceeds its bound the check degrades to structural
    /// equality.
    pub fn is_covered_by(&self, other: &StringTree) -> bool {
        if self == other || *other == StringTree::Dynamic {
            return true;
        }
        if let StringTree::Or(alternatives) = self {
            return alternatives.iter().all(|alternative| alternative.is_covered_by(other));
        }
        if let StringTree::Or(alternatives) = other {
            if alternatives.iter().any(|alternative| self.is_covered_by(alternative)) {
                return true;
            }
        }
        let (Some(mine), Some(theirs)) = (self.sequences(), other.sequences()) else {
            return false;
        };
        mine.iter()
            .all(|text| theirs.iter().any(|pattern| glob_match(pattern, text)))
    }

    fn sequences(&self) -> Option<Vec<Vec<Token<'_>>>> {
        match self {
            StringTree::Const(value) => Some(vec![value.chars().map(Token::Char).collect()]),
            StringTree::Dynamic => Some(vec![vec![Token::Any]]),
            StringTree::Repeat(inner) => {
                let mut out = vec![Vec::new()];
                out.extend(inner.sequences()?);
                out.push(vec![Token::Opaque(self)]);
                (out.len() <= EXPANSION_LIMIT).then_some(out)
            }
            StringTree::Or(alternatives) => {
                let mut out = Vec::new();
                for alternative in alternatives {
                    out.extend(alternative.sequences()?);
                    if out.len() > EXPANSION_LIMIT {
                        return None;
                    }
                }
                Some(out)
            }
            StringTree::Concat(parts) => {
                let mut out: Vec<Vec<Token<'_>>> = vec![Vec::new()];
                for part in parts {
                    let suffixes = part.sequences()?;
                    if out.len() * suffixes.len() > EXPANSION_LIMIT {
                        return None;
                    }
                    out = out
                        .iter()
                        .flat_map(|prefix| {
                            suffixes.iter().map(move |suffix| {
                                let mut joined = prefix.clone();
                                joined.extend(suffix.iter().cloned());
                                joined
                            })
                        })
                        .collect();
                }
                Some(out)
            }
        }
    }
}

fn push_concat_part(parts: &mut Vec<StringTree>, part: StringTree) {
    match part {
        StringTree::Const(value) if value.is_empty() => {}
        StringTree::Const(value) => {
            if let Some(StringTree::Const(prev)) = parts.last_mut() {
                prev.push_str(&value);
            } else {
                parts.push(StringTree::Const(value));
            }
        }
        StringTree::Dynamic if parts.last() == Some(&StringTree::Dynamic) => {}
        other => parts.push(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Char(char),
    Any,
    /// A repetition kept whole
    Opaque(&'a StringTree),
}

impl Token<'_> {
    /// Whether this pattern token describes the single text token
    fn admits(&self, text: &Token<'_>) -> bool {
        match (self, text) {
            (Token::Char(a), Token::Char(b)) => a == b,
            (Token::Opaque(StringTree::Repeat(wide)), Token::Opaque(StringTree::Repeat(narrow))) => {
                narrow.is_covered_by(wide)
            }
            (Token::Opaque(a), Token::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

/// Glob match where `Any` in the pattern absorbs any run of text tokens
fn glob_match(pattern: &[Token<'_>], text: &[Token<'_>]) -> bool {
    let mut row = vec![false; text.len() + 1];
    row[0] = true;
    for token in pattern {
        let mut next = vec![false; text.len() + 1];
        if *token == Token::Any {
            next[0] = row[0];
            for j in 1..=text.len() {
                next[j] = row[j] || next[j - 1];
            }
        } else {
            for j in 1..=text.len() {
                next[j] = row[j - 1] && token.admits(&text[j - 1]);
            }
        }
        row = next;
    }
    row[text.len()]
}

/// Coarse constancy classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StringLevel {
    NoFlow,
    Constant,
    PartiallyConstant,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringConstancy {
    /// No string reaches this location
    NoFlow,
    /// Exactly one fully known string
    Constant(String),
    /// Known and unknown parts, or several alternatives
    PartiallyConstant(StringTree),
    /// Nothing is known
    Dynamic,
}

impl StringConstancy {
    pub fn constant(value: impl Into<String>) -> Self {
        StringConstancy::Constant(value.into())
    }

    pub fn from_tree(tree: StringTree) -> Self {
        match tree {
            StringTree::Const(value) => StringConstancy::Constant(value),
            StringTree::Dynamic => StringConstancy::Dynamic,
            other if !other.has_constant_part() => StringConstancy::Dynamic,
            other => StringConstancy::PartiallyConstant(other),
        }
    }

    pub fn tree(&self) -> Option<StringTree> {
        match self {
            StringConstancy::NoFlow => None,
            StringConstancy::Constant(value) => Some(StringTree::Const(value.clone())),
            StringConstancy::PartiallyConstant(tree) => Some(tree.clone()),
            StringConstancy::Dynamic => Some(StringTree::Dynamic),
        }
    }

    pub fn level(&self) -> StringLevel {
        match self {
            StringConstancy::NoFlow => StringLevel::NoFlow,
            StringConstancy::Constant(_) => StringLevel::Constant,
            StringConstancy::PartiallyConstant(_) => StringLevel::PartiallyConstant,
            StringConstancy::Dynamic => StringLevel::Dynamic,
        }
    }

    /// Regex-like rendering; empty for `NoFlow`
    pub fn pattern(&self) -> String {
        self.tree().map(|tree| tree.pattern()).unwrap_or_default()
    }

    /// Concatenation; no flow on either side means no flow overall
    pub fn concat(&self, other: &StringConstancy) -> StringConstancy {
        match (self.tree(), other.tree()) {
            (Some(left), Some(right)) => Self::from_tree(StringTree::concat([left, right])),
            _ => StringConstancy::NoFlow,
        }
    }

    /// Alternation; no flow is the identity
    pub fn or(&self, other: &StringConstancy) -> StringConstancy {
        match (self.tree(), other.tree()) {
            (Some(left), Some(right)) => Self::from_tree(StringTree::or([left, right])),
            (Some(_), None) => self.clone(),
            (None, _) => other.clone(),
        }
    }

    pub fn repeat(&self) -> StringConstancy {
        match self.tree() {
            Some(tree) => Self::from_tree(StringTree::repeat(tree)),
            None => StringConstancy::NoFlow,
        }
    }

    pub fn leq(&self, other: &StringConstancy) -> bool {
        match (self, other) {
            (StringConstancy::NoFlow, _) | (_, StringConstancy::Dynamic) => true,
            (_, StringConstancy::NoFlow) | (StringConstancy::Dynamic, _) => false,
            _ => match (self.tree(), other.tree()) {
                (Some(mine), Some(theirs)) => mine.is_covered_by(&theirs),
                _ => false,
            },
        }
    }
}

impl fmt::Display for StringConstancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringConstancy::NoFlow => write!(f, "NoFlow"),
            StringConstancy::Dynamic => write!(f, "Dynamic"),
            other => write!(f, "{:?}(\"{}\")", other.level(), other.pattern()),
        }
    }
}

/// Lattice over [`StringConstancy`] with a widening bound
#[derive(Debug, Clone, Copy)]
pub struct StringConstancyLattice {
    max_alternatives: usize,
    max_size: usize,
}

impl Default for StringConstancyLattice {
    fn default() -> Self {
        Self {
            max_alternatives: 16,
            max_size: 256,
        }
    }
}

impl StringConstancyLattice {
    pub fn with_bounds(max_alternatives: usize, max_size: usize) -> Self {
        Self {
            max_alternatives: max_alternatives.max(1),
            max_size: max_size.max(1),
        }
    }

    fn unwrap(value: &PropertyValue) -> StringConstancy {
        value
            .as_strings()
            .cloned()
            .unwrap_or(StringConstancy::Dynamic)
    }

    /// Degrade oversized values to `Dynamic`
    pub fn widen_constancy(&self, value: StringConstancy) -> StringConstancy {
        match &value {
            StringConstancy::PartiallyConstant(tree)
                if tree.alternatives() > self.max_alternatives || tree.size() > self.max_size =>
            {
                StringConstancy::Dynamic
            }
            StringConstancy::Constant(s) if s.chars().count() > self.max_size => {
                StringConstancy::Dynamic
            }
            _ => value,
        }
    }
}

impl Lattice for StringConstancyLattice {
    fn name(&self) -> &'static str {
        "StringConstancy"
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Strings(_))
    }

    fn leq(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        Self::unwrap(a).leq(&Self::unwrap(b))
    }

    fn join(&self, a: &PropertyValue, b: &PropertyValue) -> PropertyValue {
        self.widen_constancy(Self::unwrap(a).or(&Self::unwrap(b)))
            .into()
    }

    fn bottom(&self) -> PropertyValue {
        StringConstancy::NoFlow.into()
    }

    fn fallback(&self) -> PropertyValue {
        StringConstancy::Dynamic.into()
    }

    fn widen(&self, value: PropertyValue) -> PropertyValue {
        match value {
            PropertyValue::Strings(s) => self.widen_constancy(s).into(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> StringTree {
        StringTree::constant(s)
    }

    #[test]
    fn test_concat_merges_constants() {
        let tree = StringTree::concat([c("java."), c(""), c("lang")]);
        assert_eq!(tree, c("java.lang"));
    }

    #[test]
    fn test_branch_merge_pattern() {
        let tree = StringTree::concat([c("a"), StringTree::or([c("b"), c("c")])]);
        assert_eq!(tree.pattern(), "a(b|c)");
        assert_eq!(
            StringConstancy::from_tree(tree).level(),
            StringLevel::PartiallyConstant
        );
    }

    #[test]
    fn test_or_is_canonical() {
        let left = StringTree::or([c("b"), c("a"), c("b")]);
        let right = StringTree::or([c("a"), StringTree::or([c("b")])]);
        assert_eq!(left, right);
        assert_eq!(left.pattern(), "(a|b)");
    }

    #[test]
    fn test_or_with_dynamic_is_dynamic() {
        assert_eq!(StringTree::or([c("a"), StringTree::Dynamic]), StringTree::Dynamic);
    }

    #[test]
    fn test_or_prunes_covered_alternatives() {
        let wide = StringTree::concat([c("x"), StringTree::Dynamic]);
        let tree = StringTree::or([c("xy"), wide.clone()]);
        assert_eq!(tree, wide);
    }

    #[test]
    fn test_distributed_alternatives_are_covered() {
        let factored = StringTree::concat([c("x"), StringTree::or([c("b"), c("c")])]);
        assert!(c("xb").is_covered_by(&factored));
        assert!(StringTree::or([c("xb"), c("xc")]).is_covered_by(&factored));
        assert!(!c("xd").is_covered_by(&factored));
    }

    #[test]
    fn test_dynamic_suffix_covers_constant_prefix() {
        let partial = StringConstancy::from_tree(StringTree::concat([c("java.lang."), StringTree::Dynamic]));
        let constant = StringConstancy::constant("java.lang.");
        assert!(constant.leq(&partial));
        assert!(!partial.leq(&constant));
    }

    #[test]
    fn test_no_flow_semantics() {
        let a = StringConstancy::constant("a");
        assert_eq!(a.concat(&StringConstancy::NoFlow), StringConstancy::NoFlow);
        assert_eq!(a.or(&StringConstancy::NoFlow), a);
        assert!(StringConstancy::NoFlow.leq(&a));
    }

    #[test]
    fn test_fully_unknown_tree_is_dynamic() {
        let tree = StringTree::concat([StringTree::Dynamic, StringTree::Dynamic]);
        assert_eq!(StringConstancy::from_tree(tree), StringConstancy::Dynamic);
    }

    #[test]
    fn test_widening_degrades_to_dynamic() {
        let lattice = StringConstancyLattice::with_bounds(2, 256);
        let joined = [c("a"), c("b"), c("c")]
            .into_iter()
            .map(|t| PropertyValue::from(StringConstancy::from_tree(t)))
            .reduce(|acc, next| lattice.join(&acc, &next))
            .unwrap();
        assert_eq!(joined, PropertyValue::Strings(StringConstancy::Dynamic));
    }

    #[test]
    fn test_repetition_covers_zero_and_one_iteration() {
        let repeated = StringTree::concat([c("a"), StringTree::repeat(c("b"))]);
        assert!(c("a").is_covered_by(&repeated));
        assert!(c("ab").is_covered_by(&repeated));
        assert!(!c("ac").is_covered_by(&repeated));
        assert!(!repeated.is_covered_by(&c("ab")));
        assert_eq!(StringTree::or([c("a"), repeated.clone()]), repeated);
    }

    #[test]
    fn test_repetition_of_wider_body_covers() {
        let narrow = StringTree::concat([c("a"), StringTree::repeat(c("b"))]);
        let wide = StringTree::concat([c("a"), StringTree::repeat(StringTree::or([c("b"), c("c")]))]);
        assert!(narrow.is_covered_by(&wide));
        assert!(!wide.is_covered_by(&narrow));
    }

    #[test]
    fn test_display() {
        let value = StringConstancy::from_tree(StringTree::repeat(c("ab")));
        insta::assert_snapshot!(value.to_string(), @r#"PartiallyConstant("(ab)*")"#);
    }
}
