//! Shared tokenizer and pattern-rewrite core.
//!
//! ```text
//! SQL text ──tokenize──> [Token] ──RuleSet::apply──> [Token] ──join──> SQL text
//! ```
//!
//! Both the schema importer and the runtime query massager are built on it.

pub mod pattern;
pub mod rules;
pub mod tokenizer;

pub use pattern::{replace, replace_str, Rule};
pub use rules::RuleSet;
pub use tokenizer::{join, tokenize, Token};
