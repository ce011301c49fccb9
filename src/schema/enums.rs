use crate::error::{Result, ShimError};
use crate::rewrite::{tokenize, Rule, Token};

/// An enumerated type declared with `CREATE TYPE <name> AS ENUM (...)`.
#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    /// Quoted string literals, exactly as written (e.g. `'open'`).
    pub values: Vec<String>,
    rule: Rule,
}

impl EnumType {
    pub fn new(name: &str, values: Vec<String>) -> Result<Self> {
        let rule = Rule::new(
            &format!("$1 {}", name),
            &format!("$1 text check ($1 in ({}))", values.join(", ")),
        )?;
        Ok(Self {
            name: name.to_string(),
            values,
            rule,
        })
    }

    /// Parse a `CREATE TYPE <name> AS ENUM ('a', 'b', ...)` statement.
    pub fn parse(statement: &str) -> Result<Self> {
        let tokens = tokenize(statement);
        let name = tokens
            .get(2)
            .ok_or_else(|| ShimError::translation(format!("enum declaration without a name: {statement}")))?;

        let open = tokens.iter().position(|t| t.as_str() == "(");
        let close = tokens.iter().position(|t| t.as_str() == ")");
        let values = match (open, close) {
            (Some(open), Some(close)) if open < close => tokens[open + 1..close]
                .iter()
                .filter(|t| t.is_string_literal())
                .map(|t| t.as_str().to_string())
                .collect(),
            _ => {
                return Err(ShimError::translation(format!(
                    "enum declaration without a value list: {statement}"
                )))
            }
        };

        Self::new(name.as_str(), values)
    }

    /// Rewrite `<column> <name>` declarations into a text column with a check
    /// constraint over the permitted values.
    pub fn apply(&self, tokens: &mut Vec<Token>) -> usize {
        self.rule.apply(tokens)
    }
}

/// Enum types declared so far, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
    types: Vec<EnumType>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any earlier declaration with the same name.
    pub fn register(&mut self, enum_type: EnumType) {
        match self.types.iter_mut().find(|t| t.name == enum_type.name) {
            Some(existing) => *existing = enum_type,
            None => self.types.push(enum_type),
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnumType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Apply every registered type's rewrite, in registration order.
    pub fn apply(&self, tokens: &mut Vec<Token>) -> usize {
        self.types.iter().map(|t| t.apply(tokens)).sum()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
