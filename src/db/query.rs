use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use super::value::CellValue;
use crate::error::ShimError;

/// Categorized error types for engine failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601 / 42000)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Constraint violations (SQLSTATE class 23)
    Integrity,
    /// Data exceptions and resource limits
    Execution,
    /// Serialization failures and deadlocks (SQLSTATE class 40)
    Rollback,
    /// Invalid transaction state
    Transaction,
    /// Connection/communication errors
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Integrity => write!(f, "Integrity Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Rollback => write!(f, "Transaction Rollback"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// Categorize a SQLSTATE code into an ErrorCategory.
pub fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    let class = &code[..2];
    match class {
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                // 42P01 = undefined_table, 42703 = undefined_column, etc.
                ErrorCategory::Semantic
            }
        }
        "23" => ErrorCategory::Integrity,
        "40" => ErrorCategory::Rollback,
        "22" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// Map a tokio-postgres error onto the library error, keeping the query
/// text for syntax/semantic failures.
pub fn from_pg_error(err: &tokio_postgres::Error, query: &str) -> ShimError {
    let Some(db_err) = err.as_db_error() else {
        let message = match err.source() {
            Some(source) => format!("{}: {}", err, source),
            None => err.to_string(),
        };
        return ShimError::Database(message);
    };

    let message = db_err.message().to_string();
    match categorize_sqlstate(db_err.code().code()) {
        ErrorCategory::Syntax | ErrorCategory::Semantic => ShimError::InvalidQuery {
            message,
            query: query.to_string(),
        },
        ErrorCategory::Integrity => ShimError::Integrity(message),
        ErrorCategory::Rollback => ShimError::TransactionRollback(message),
        category => ShimError::Database(format!("{}: {}", category, message)),
    }
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub max_width: usize,
}

/// Rows produced by one statement.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub execution_time: Duration,
    pub affected_rows: Option<u64>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            execution_time: Duration::ZERO,
            affected_rows: None,
        }
    }

    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<CellValue>>, execution_time: Duration) -> Self {
        let mut result = Self {
            columns,
            rows,
            execution_time,
            affected_rows: None,
        };
        result.compute_widths();
        result
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn compute_widths(&mut self) {
        for column in &mut self.columns {
            column.max_width = column.name.len();
        }
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(column) = self.columns.get_mut(i) {
                    column.max_width = column.max_width.max(cell.display_width());
                }
            }
        }
    }
}
