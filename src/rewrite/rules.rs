//! Ordered, named rewrite rules.
//!
//! Rules run in insertion order, each over the full token sequence, so a
//! later rule sees the output of every earlier one.

use super::pattern::Rule;
use super::tokenizer::Token;
use crate::error::Result;

#[derive(Debug, Clone)]
struct NamedRule {
    name: String,
    rule: Rule,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<NamedRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from `(name, old, new)` triples.
    pub fn from_table(table: &[(&str, &str, &str)]) -> Result<Self> {
        let mut set = Self::new();
        for (name, old, new) in table {
            set.add(name, Rule::new(old, new)?);
        }
        Ok(set)
    }

    pub fn add(&mut self, name: &str, rule: Rule) {
        self.rules.push(NamedRule {
            name: name.to_string(),
            rule,
        });
    }

    /// Apply every rule in order; returns the total number of replacements.
    pub fn apply(&self, tokens: &mut Vec<Token>) -> usize {
        let mut total = 0;
        for named in &self.rules {
            let count = named.rule.apply(tokens);
            if count > 0 {
                tracing::trace!(rule = %named.name, count, "rewrite rule applied");
            }
            total += count;
        }
        total
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
