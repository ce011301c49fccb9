//! Flat SQL tokenizer.
//!
//! Splits SQL text into the substrings the rewrite engine operates on. This
//! is a lexer only: parentheses are ordinary one-character tokens and no
//! nesting is tracked.

use std::fmt;

/// A single lexical unit, stored with its original case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Token(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `$` followed by one or more digits.
    pub fn is_wildcard(&self) -> bool {
        self.0
            .strip_prefix('$')
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Single-quoted string literal, e.g. `'open'`.
    pub fn is_string_literal(&self) -> bool {
        self.0.len() >= 2 && self.0.starts_with('\'') && self.0.ends_with('\'')
    }

    /// Case-insensitive comparison used for keyword and literal matching.
    pub fn matches(&self, other: &Token) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(text: &str) -> Self {
        Token(text.to_string())
    }
}

impl From<String> for Token {
    fn from(text: String) -> Self {
        Token(text)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split `sql` into tokens.
///
/// Recognition order: positional wildcard, two-character comparison
/// operator, single-quoted string (quotes escaped by doubling), double-quoted
/// identifier, word run, then any other non-space character on its own.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).map(|&(_, c)| c);
        let end = match c {
            '$' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                j
            }
            '!' | '<' | '>' if is_comparison(c, next) => i + 2,
            '\'' => scan_single_quoted(&chars, i).unwrap_or(i + 1),
            '"' => scan_double_quoted(&chars, i).unwrap_or(i + 1),
            c if is_word_char(c) => {
                let mut j = i + 1;
                while j < chars.len() && is_word_char(chars[j].1) {
                    j += 1;
                }
                j
            }
            _ => i + 1,
        };

        let byte_end = chars.get(end).map(|&(b, _)| b).unwrap_or(sql.len());
        tokens.push(Token::new(&sql[start..byte_end]));
        i = end;
    }

    tokens
}

fn is_comparison(first: char, second: Option<char>) -> bool {
    matches!(
        (first, second),
        ('!', Some('=')) | ('<', Some('>')) | ('<', Some('=')) | ('>', Some('='))
    )
}

/// Index one past the closing quote, or `None` when unterminated.
fn scan_single_quoted(chars: &[(usize, char)], open: usize) -> Option<usize> {
    let mut j = open + 1;
    while j < chars.len() {
        if chars[j].1 == '\'' {
            if chars.get(j + 1).map(|&(_, c)| c) == Some('\'') {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

fn scan_double_quoted(chars: &[(usize, char)], open: usize) -> Option<usize> {
    chars[open + 1..]
        .iter()
        .position(|&(_, c)| c == '"')
        .map(|offset| open + 1 + offset + 1)
}

/// Re-join tokens with single spaces.
pub fn join(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(token.as_str());
    }
    out
}
