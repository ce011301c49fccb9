//! Token-pattern match and substitute engine.
//!
//! A pattern is a token sequence in which `$N` tokens are wildcards: each
//! matches any single token and binds its text. A [`Rule`] replaces every
//! non-overlapping, left-to-right occurrence of its old pattern with its new
//! pattern, re-emitting bound text wherever the new pattern names a wildcard.

use std::collections::{HashMap, HashSet};

use super::tokenizer::{join, tokenize, Token};
use crate::error::{Result, ShimError};

/// A validated old → new pattern pair.
#[derive(Debug, Clone)]
pub struct Rule {
    old: Vec<Token>,
    new: Vec<Token>,
    /// Offset of the first literal token in `old`.
    anchor: usize,
}

impl Rule {
    /// Tokenize both patterns and validate the old one.
    pub fn new(old: &str, new: &str) -> Result<Self> {
        Self::from_tokens(tokenize(old), tokenize(new))
    }

    pub fn from_tokens(old: Vec<Token>, new: Vec<Token>) -> Result<Self> {
        let reject = |reason: &str| ShimError::InvalidRule {
            pattern: join(&old),
            reason: reason.to_string(),
        };

        let anchor = match old.iter().position(|t| !t.is_wildcard()) {
            Some(anchor) => anchor,
            None if old.is_empty() => return Err(reject("old pattern is empty")),
            None => return Err(reject("old pattern has no literal token to anchor on")),
        };

        let mut seen = HashSet::new();
        for token in old.iter().filter(|t| t.is_wildcard()) {
            if !seen.insert(token.as_str()) {
                return Err(reject(&format!("wildcard {} appears more than once", token)));
            }
        }

        Ok(Self { old, new, anchor })
    }

    /// Rewrite `tokens` in place, returning the number of replacements.
    pub fn apply(&self, tokens: &mut Vec<Token>) -> usize {
        let anchor_token = &self.old[self.anchor];
        let mut cursor = 0;
        let mut replaced = 0;

        loop {
            let remaining = tokens.len().saturating_sub(cursor);

            let search_from = cursor + self.anchor;
            let Some(found) = tokens
                .iter()
                .skip(search_from)
                .position(|t| t.matches(anchor_token))
            else {
                return replaced;
            };
            let start = search_from + found - self.anchor;

            if start + self.old.len() > tokens.len() {
                return replaced;
            }

            let Some(bindings) = self.match_at(tokens, start) else {
                cursor = start + 1;
                continue;
            };

            let substitution = self.substitute(&bindings);
            let inserted = substitution.len();
            tokens.splice(start..start + self.old.len(), substitution);
            cursor = start + inserted;
            replaced += 1;

            debug_assert!(
                tokens.len().saturating_sub(cursor) < remaining,
                "rewrite made no progress"
            );
        }
    }

    /// Compare the old pattern against the window at `start`.
    fn match_at<'t>(&self, tokens: &'t [Token], start: usize) -> Option<HashMap<&str, &'t Token>> {
        let mut bindings = HashMap::new();
        for (pattern, token) in self.old.iter().zip(&tokens[start..start + self.old.len()]) {
            if pattern.is_wildcard() {
                bindings.insert(pattern.as_str(), token);
            } else if !pattern.matches(token) {
                return None;
            }
        }
        Some(bindings)
    }

    fn substitute(&self, bindings: &HashMap<&str, &Token>) -> Vec<Token> {
        self.new
            .iter()
            .map(|token| match bindings.get(token.as_str()) {
                Some(bound) => (*bound).clone(),
                None => token.clone(),
            })
            .collect()
    }
}

/// One-shot rewrite of a token sequence.
pub fn replace(tokens: &mut Vec<Token>, old: &str, new: &str) -> Result<usize> {
    Ok(Rule::new(old, new)?.apply(tokens))
}

/// Tokenize `sql`, rewrite it, and join the result with single spaces.
pub fn replace_str(sql: &str, old: &str, new: &str) -> Result<String> {
    let mut tokens = tokenize(sql);
    replace(&mut tokens, old, new)?;
    Ok(join(&tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(items: &[&str]) -> Vec<Token> {
        items.iter().map(|s| Token::from(*s)).collect()
    }

    #[test]
    fn test_swap_with_wildcard() {
        let mut tokens = words(&["a", "x", "b", "a", "y", "b"]);
        let count = replace(&mut tokens, "a $1 b", "b $1 a").unwrap();
        assert_eq!(count, 2);
        assert_eq!(tokens, words(&["b", "x", "a", "b", "y", "a"]));
    }

    #[test]
    fn test_identity_rewrite_leaves_tokens_unchanged() {
        let original = tokenize("SELECT a FROM t WHERE a = 1 AND a = 1");
        let mut tokens = original.clone();
        replace(&mut tokens, "a = 1", "a = 1").unwrap();
        assert_eq!(tokens, original);
    }

    #[test]
    fn test_empty_replacement_removes_every_occurrence() {
        let mut tokens = tokenize("x FETCH FIRST ROW ONLY y FETCH FIRST ROW ONLY");
        let count = replace(&mut tokens, "FETCH FIRST ROW ONLY", "").unwrap();
        assert_eq!(count, 2);
        assert_eq!(tokens, words(&["x", "y"]));
    }

    #[test]
    fn test_literals_match_case_insensitively_and_bound_text_keeps_case() {
        assert_eq!(
            replace_str("select Md5(UserName) from users", "MD5($1)", "$1").unwrap(),
            "select UserName from users"
        );
    }

    #[test]
    fn test_leading_wildcard_binds_preceding_token() {
        assert_eq!(
            replace_str("CREATE TABLE t ( s status , n int )", "$1 status", "$1 text").unwrap(),
            "CREATE TABLE t ( s text , n int )"
        );
    }

    #[test]
    fn test_leading_wildcard_at_sequence_start_does_not_fit() {
        assert_eq!(replace_str("status x", "$1 status", "$1 text").unwrap(), "status x");
    }

    #[test]
    fn test_failed_candidate_advances_past_anchor() {
        // The first "FIRST" is not followed by ROW ONLY; the second is.
        assert_eq!(
            replace_str("FETCH FIRST x FETCH FIRST ROW ONLY", "FETCH FIRST ROW ONLY", "").unwrap(),
            "FETCH FIRST x"
        );
    }

    #[test]
    fn test_window_past_end_stops() {
        assert_eq!(replace_str("a FETCH FIRST", "FETCH FIRST ROW ONLY", "").unwrap(), "a FETCH FIRST");
    }

    #[test]
    fn test_unbound_wildcard_in_new_pattern_is_literal() {
        assert_eq!(replace_str("f ( x )", "f ( $1 )", "g ( $1 , $2 )").unwrap(), "g ( x , $2 )");
    }

    #[test]
    fn test_wildcard_free_rule_uses_new_pattern_verbatim() {
        assert_eq!(replace_str("a TRUE b true", "TRUE", "1").unwrap(), "a 1 b 1");
    }

    #[test]
    fn test_new_pattern_containing_old_terminates() {
        assert_eq!(replace_str("a commit b", "commit", "commit commit").unwrap(), "a commit commit b");
    }

    #[test]
    fn test_substitution_is_not_rematched() {
        assert_eq!(
            replace_str("x $1 y", "$1 y", "y y").unwrap(),
            "x y y"
        );
    }

    #[test]
    fn test_rejects_all_wildcard_pattern() {
        let err = Rule::new("$1 $2", "x").unwrap_err();
        assert!(matches!(err, ShimError::InvalidRule { .. }));
    }

    #[test]
    fn test_rejects_empty_pattern() {
        assert!(Rule::new("   ", "x").is_err());
    }

    #[test]
    fn test_rejects_repeated_wildcard() {
        let err = Rule::new("$1 = $1", "1").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert_eq!(
            replace_str("SELECT a - b", "$1 - $2", "$2 - $1").unwrap(),
            "SELECT b - a"
        );
    }
}
