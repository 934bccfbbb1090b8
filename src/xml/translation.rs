//! Namespace translation rules
//!
//! A translation maps namespace URIs matching a regular expression onto a
//! replacement, with `$n` capture substitution. An ordered set of rules is
//! applied first-match-wins; a URI no rule matches passes through unchanged.

use crate::cache::RegexCache;
use crate::error::{Result, SluiceError};
use regex::Regex;
use std::sync::Arc;

/// One namespace rewriting rule.
#[derive(Clone)]
pub struct NamespaceTranslation {
    pattern: String,
    matcher: Arc<Regex>,
    replacement: String,
}

impl NamespaceTranslation {
    /// Build a rule from a matching pattern and a replacement, which may use
    /// `$n` to substitute captures. The empty pattern matches only the empty
    /// namespace URI.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let effective = if pattern.is_empty() { "^$" } else { pattern };
        let matcher = RegexCache::global().get(effective)?;
        Ok(Self {
            pattern: pattern.to_owned(),
            matcher,
            replacement: replacement.into(),
        })
    }

    /// The matching pattern, as supplied.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The replacement, as supplied.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    fn matches(&self, uri: &str) -> bool {
        self.matcher.is_match(uri)
    }

    fn apply(&self, uri: &str) -> String {
        self.matcher
            .replace(uri, self.replacement.as_str())
            .into_owned()
    }
}

/// Ordered collection of translation rules.
///
/// A set marked override wins any later union: defaults it is merged with are
/// discarded entirely.
#[derive(Clone, Default)]
pub struct TranslationSet {
    rules: Vec<NamespaceTranslation>,
    override_others: bool,
}

impl TranslationSet {
    /// Build a set from ordered rules.
    pub fn new(rules: Vec<NamespaceTranslation>) -> Result<Self> {
        Self::with_override(rules, false)
    }

    /// Build a set that, when unioned with another, keeps only its own rules.
    pub fn with_override(rules: Vec<NamespaceTranslation>, override_others: bool) -> Result<Self> {
        check_conflicts(&rules)?;
        Ok(Self {
            rules,
            override_others,
        })
    }

    /// The set with no rules: every URI passes through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this set discards the other side of a union.
    pub fn is_override(&self) -> bool {
        self.override_others
    }

    /// The rules, in application order.
    pub fn rules(&self) -> &[NamespaceTranslation] {
        &self.rules
    }

    /// Translate a namespace URI. The first matching rule wins; no match
    /// passes the URI through unchanged.
    pub fn translate(&self, uri: &str) -> String {
        for rule in &self.rules {
            if rule.matches(uri) {
                return rule.apply(uri);
            }
        }
        uri.to_owned()
    }

    /// Merge with `other`. An overriding `self` is returned unchanged;
    /// otherwise the rule lists are concatenated with duplicate
    /// (pattern, replacement) pairs collapsed. The merged set never
    /// overrides.
    pub fn union(self, other: TranslationSet) -> Result<TranslationSet> {
        if self.override_others {
            return Ok(self);
        }
        let mut rules = self.rules;
        for rule in other.rules {
            let duplicate = rules
                .iter()
                .any(|r| r.pattern() == rule.pattern() && r.replacement() == rule.replacement());
            if !duplicate {
                rules.push(rule);
            }
        }
        Self::with_override(rules, false)
    }
}

/// Two rules with the same pattern but different replacements would make the
/// outcome depend on rule order alone; reject the set outright.
fn check_conflicts(rules: &[NamespaceTranslation]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        for later in &rules[i + 1..] {
            if rule.pattern() == later.pattern() && rule.replacement() != later.replacement() {
                return Err(SluiceError::ConfigurationConflict(format!(
                    "pattern {:?} maps to both {:?} and {:?}",
                    rule.pattern(),
                    rule.replacement(),
                    later.replacement()
                )));
            }
        }
    }
    Ok(())
}
