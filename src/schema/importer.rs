use std::path::Path;

use tracing::{error, info, warn};

use super::enums::{EnumRegistry, EnumType};
use super::loader::load_statements;
use crate::error::Result;
use crate::rewrite::{join, tokenize, RuleSet, Token};

/// Fixed rewrites applied to every translatable statement, before the
/// per-enum column rewrites.
const SCHEMA_RULES: &[(&str, &str, &str)] = &[
    (
        "default_now",
        "DEFAULT NOW()",
        "DEFAULT (cast(strftime('%s', 'now') as integer))",
    ),
    ("true", "TRUE", "1"),
    ("false", "FALSE", "0"),
    ("zero_interval", "INTERVAL '0'", "0"),
    ("serial_primary_key", "SERIAL PRIMARY KEY", "INTEGER PRIMARY KEY"),
    ("quote_commit", "commit", "\"commit\""),
    ("quote_transaction", "transaction", "\"transaction\""),
];

/// Index name suffixes for index methods the target does not implement.
const SPECIALIZED_INDEX_SUFFIXES: &[&str] = &["_md5", "_gin"];

/// A destination for translated schema statements.
pub trait SchemaTarget {
    fn execute(&mut self, statement: &str) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
}

/// How the importer handles a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SET ...`: session configuration, dropped.
    SessionSetting,
    /// Index using a specialized method or a partial-index `WHERE`, dropped.
    UnsupportedIndex,
    /// `CREATE TABLE` / `CREATE [UNIQUE] INDEX` / `CREATE VIEW` / `INSERT INTO`.
    Translatable,
    /// `CREATE TYPE <name> AS ENUM (...)`: registered, never executed.
    EnumDeclaration,
    /// `ALTER TABLE ...`: post-hoc constraints, dropped.
    AlterTable,
    Unrecognized,
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    token.is_some_and(|t| t.as_str().eq_ignore_ascii_case(keyword))
}

/// Classify a statement by its leading keywords.
pub fn classify(statement: &str) -> StatementKind {
    let tokens = tokenize(statement);
    let at = |i: usize, keyword: &str| is_keyword(tokens.get(i), keyword);

    if at(0, "SET") {
        return StatementKind::SessionSetting;
    }

    if at(0, "CREATE") {
        let index_at = if at(1, "INDEX") {
            Some(1)
        } else if at(1, "UNIQUE") && at(2, "INDEX") {
            Some(2)
        } else {
            None
        };

        if let Some(index_at) = index_at {
            let specialized_name = tokens.get(index_at + 1).is_some_and(|name| {
                let name = name.as_str().to_ascii_lowercase();
                SPECIALIZED_INDEX_SUFFIXES
                    .iter()
                    .any(|suffix| name.find(suffix).is_some_and(|pos| pos > 0))
            });
            let partial = tokens[index_at + 1..]
                .iter()
                .any(|t| t.as_str().eq_ignore_ascii_case("WHERE"));
            return if specialized_name || partial {
                StatementKind::UnsupportedIndex
            } else {
                StatementKind::Translatable
            };
        }

        if at(1, "TABLE") || at(1, "VIEW") {
            return StatementKind::Translatable;
        }
        if at(1, "TYPE") && at(3, "AS") && at(4, "ENUM") {
            return StatementKind::EnumDeclaration;
        }
    }

    if at(0, "INSERT") && at(1, "INTO") {
        return StatementKind::Translatable;
    }
    if at(0, "ALTER") && at(1, "TABLE") {
        return StatementKind::AlterTable;
    }

    StatementKind::Unrecognized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unrecognized,
    Translation,
    Execution,
}

#[derive(Debug, Clone)]
pub struct StatementFailure {
    pub kind: FailureKind,
    pub statement: String,
    /// Statement text as sent to the target, when it differs from the source.
    pub translated: Option<String>,
    pub message: String,
}

/// Outcome of one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub executed: usize,
    pub skipped: usize,
    pub failures: Vec<StatementFailure>,
    /// Enum types declared by the imported statements.
    pub enums: EnumRegistry,
    pub committed: bool,
}

impl ImportReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Translates and applies schema statements in order.
///
/// Every statement is attempted; a failure marks the run failed and withholds
/// the single commit issued at the end, but never stops the run.
#[derive(Debug, Clone)]
pub struct SchemaImporter {
    rules: RuleSet,
    quiet: bool,
}

impl SchemaImporter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: RuleSet::from_table(SCHEMA_RULES)?,
            quiet: false,
        })
    }

    /// Suppress the per-statement echo.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Apply the fixed rewrite table and then every registered enum rewrite.
    pub fn translate(&self, statement: &str, enums: &EnumRegistry) -> String {
        let mut tokens = tokenize(statement);
        self.rules.apply(&mut tokens);
        enums.apply(&mut tokens);
        join(&tokens)
    }

    pub fn import_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        target: &mut impl SchemaTarget,
    ) -> Result<ImportReport> {
        let statements = load_statements(paths)?;
        Ok(self.import_statements(&statements, target))
    }

    pub fn import_statements<S: AsRef<str>>(
        &self,
        statements: &[S],
        target: &mut impl SchemaTarget,
    ) -> ImportReport {
        let mut report = ImportReport::default();

        for statement in statements {
            let statement = statement.as_ref();
            let command = match classify(statement) {
                StatementKind::SessionSetting
                | StatementKind::UnsupportedIndex
                | StatementKind::AlterTable => {
                    report.skipped += 1;
                    continue;
                }
                StatementKind::EnumDeclaration => {
                    match EnumType::parse(statement) {
                        Ok(enum_type) => report.enums.register(enum_type),
                        Err(err) => {
                            error!("Failed: {}\n  {}", statement, err);
                            report.failures.push(StatementFailure {
                                kind: FailureKind::Translation,
                                statement: statement.to_string(),
                                translated: None,
                                message: err.to_string(),
                            });
                        }
                    }
                    continue;
                }
                StatementKind::Translatable => self.translate(statement, &report.enums),
                StatementKind::Unrecognized => {
                    error!("Unrecognized: {}", statement);
                    report.failures.push(StatementFailure {
                        kind: FailureKind::Unrecognized,
                        statement: statement.to_string(),
                        translated: None,
                        message: "unrecognized statement".to_string(),
                    });
                    statement.to_string()
                }
            };

            if !self.quiet {
                info!("{}", statement_summary(&command));
            }

            match target.execute(&command) {
                Ok(()) => report.executed += 1,
                Err(err) => {
                    error!("Failed: {}\n  {}", command, err);
                    report.failures.push(StatementFailure {
                        kind: FailureKind::Execution,
                        statement: statement.to_string(),
                        translated: (command != statement).then_some(command),
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.succeeded() {
            match target.commit() {
                Ok(()) => report.committed = true,
                Err(err) => {
                    error!("Commit failed: {}", err);
                    report.failures.push(StatementFailure {
                        kind: FailureKind::Execution,
                        statement: "COMMIT".to_string(),
                        translated: None,
                        message: err.to_string(),
                    });
                }
            }
        } else {
            warn!(
                failures = report.failures.len(),
                "schema import failed; commit withheld"
            );
        }

        report
    }
}

/// Leading upper-case keywords of a statement plus the first other word,
/// e.g. `CREATE TABLE users`.
pub fn statement_summary(statement: &str) -> String {
    let mut words = Vec::new();
    for word in statement.split_whitespace() {
        words.push(word);
        if word.to_uppercase() != word {
            break;
        }
    }
    words.join(" ")
}
