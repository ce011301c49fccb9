use std::path::Path;
use std::time::Instant;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, Statement};

use super::backend::Backend;
use super::query::{ColumnInfo, ResultSet};
use super::value::{decode_declared, format_values, CellValue, Param};
use crate::error::{Result, ShimError};
use crate::massage::{Massaged, QueryMassager};
use crate::schema::{ImportReport, SchemaImporter, SchemaTarget};

/// Translating backend: every query is massaged into the SQLite dialect
/// before it reaches the engine.
pub struct SqliteBackend {
    conn: Connection,
    massager: QueryMassager,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            ShimError::Database(format!("failed to open {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "opened SQLite database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ShimError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        Ok(Self {
            conn,
            massager: QueryMassager::new()?,
        })
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| map_error(e, "BEGIN", &[]))?;
        }
        Ok(())
    }

    fn end_transaction(&self, command: &str) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch(command)
                .map_err(|e| map_error(e, command, &[]))?;
        }
        Ok(())
    }

    /// Massage and execute one statement.
    pub fn execute_query(&mut self, query: &str, params: Vec<Param>) -> Result<ResultSet> {
        let massaged = self.massager.massage(query, params)?;
        self.begin_if_needed()?;
        self.execute_massaged(&massaged)
    }

    /// Massage once and execute for every parameter row.
    pub fn execute_many(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<u64> {
        let (sql, rows, _flags) = self.massager.massage_many(query, rows)?;
        self.begin_if_needed()?;

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| map_error(e, &sql, &[]))?;
        let mut affected = 0;
        for row in &rows {
            let values = bind_values(&sql, row)?;
            let changed = stmt
                .execute(params_from_iter(values.iter()))
                .map_err(|e| map_error(e, &sql, row))?;
            affected += changed as u64;
        }
        Ok(affected)
    }

    fn execute_massaged(&self, massaged: &Massaged) -> Result<ResultSet> {
        let sql = &massaged.query;
        let fail = |e: rusqlite::Error| map_error(e, sql, &massaged.params);
        let start = Instant::now();
        let values = bind_values(sql, &massaged.params)?;

        let mut stmt = self.conn.prepare(sql).map_err(fail)?;
        if stmt.column_count() == 0 {
            let changed = stmt.execute(params_from_iter(values.iter())).map_err(fail)?;
            if massaged.flags.returning_id {
                return self.last_insert_id(start);
            }
            let mut result = ResultSet::empty();
            result.execution_time = start.elapsed();
            result.affected_rows = Some(changed as u64);
            return Ok(result);
        }

        let (columns, rows) = read_rows(&mut stmt, &values).map_err(fail)?;
        Ok(ResultSet::new(columns, rows, start.elapsed()))
    }

    /// Stand-in for a stripped `RETURNING id`: the row id of the last insert.
    fn last_insert_id(&self, start: Instant) -> Result<ResultSet> {
        let query = "SELECT last_insert_rowid()";
        let id: i64 = self
            .conn
            .query_row(query, [], |row| row.get(0))
            .map_err(|e| map_error(e, query, &[]))?;
        let column = ColumnInfo {
            name: "id".to_string(),
            type_name: "INTEGER".to_string(),
            max_width: 0,
        };
        Ok(ResultSet::new(
            vec![column],
            vec![vec![CellValue::Int64(id)]],
            start.elapsed(),
        ))
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn run(&mut self, query: &str, params: Vec<Param>) -> Result<ResultSet> {
        self.execute_query(query, params)
    }

    async fn run_many(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<u64> {
        self.execute_many(query, rows)
    }

    async fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK")
    }

    async fn close(self) -> Result<()> {
        self.end_transaction("ROLLBACK")?;
        self.conn
            .close()
            .map_err(|(_, e)| ShimError::Database(e.to_string()))
    }
}

impl SchemaTarget for SqliteBackend {
    fn execute(&mut self, statement: &str) -> Result<()> {
        self.begin_if_needed()?;
        self.conn
            .execute_batch(statement)
            .map_err(|e| map_error(e, statement, &[]))
    }

    fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")
    }
}

/// Import schema scripts into the SQLite database at `database`, creating it
/// if needed. Nothing is committed unless every statement succeeded.
pub fn import_schema<D: AsRef<Path>, P: AsRef<Path>>(
    database: D,
    files: &[P],
    quiet: bool,
) -> Result<ImportReport> {
    let mut backend = SqliteBackend::open(database)?;
    let report = SchemaImporter::new()?
        .quiet(quiet)
        .import_files(files, &mut backend)?;
    if !report.committed {
        backend.end_transaction("ROLLBACK")?;
    }
    Ok(report)
}

fn bind_values(query: &str, params: &[CellValue]) -> Result<Vec<Value>> {
    params
        .iter()
        .map(|value| {
            to_sqlite(value).ok_or_else(|| ShimError::InvalidParameters {
                message: format!("cannot bind {} to a SQLite parameter", value.display()),
                params: format_values(params),
                query: query.to_string(),
            })
        })
        .collect()
}

/// Storage representation: booleans as integers, timestamps as epoch
/// seconds, dates as `YYYY-MM-DD` text, intervals as seconds.
fn to_sqlite(value: &CellValue) -> Option<Value> {
    let value = match value {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Integer(i64::from(*b)),
        CellValue::Int64(i) => Value::Integer(*i),
        CellValue::Float64(f) => Value::Real(*f),
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Bytes(b) => Value::Blob(b.clone()),
        CellValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        CellValue::DateTime(dt) => Value::Integer(dt.and_utc().timestamp()),
        CellValue::TimestampTz(dt) => Value::Integer(dt.timestamp()),
        CellValue::Interval(d) => Value::Integer(d.num_seconds()),
        CellValue::Json(j) => Value::Text(j.to_string()),
        CellValue::Array(_) => return None,
    };
    Some(value)
}

fn from_sqlite(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Int64(i),
        ValueRef::Real(f) => CellValue::Float64(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Bytes(b.to_vec()),
    }
}

fn read_rows(
    stmt: &mut Statement<'_>,
    values: &[Value],
) -> rusqlite::Result<(Vec<ColumnInfo>, Vec<Vec<CellValue>>)> {
    let declared: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|col| (col.name().to_string(), col.decl_type().map(str::to_string)))
        .collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(values.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(declared.len());
        for (i, (_, decl_type)) in declared.iter().enumerate() {
            let raw = from_sqlite(row.get_ref(i)?);
            cells.push(match decl_type {
                Some(decl_type) => decode_declared(decl_type, raw),
                None => raw,
            });
        }
        rows.push(cells);
    }

    let columns = declared
        .into_iter()
        .map(|(name, decl_type)| ColumnInfo {
            name,
            type_name: decl_type.unwrap_or_default(),
            max_width: 0,
        })
        .collect();
    Ok((columns, rows))
}

/// Constraint failures become integrity errors; anything else the engine
/// rejects carries the statement text as it was actually sent.
fn map_error(err: rusqlite::Error, query: &str, params: &[CellValue]) -> ShimError {
    match err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            ShimError::Integrity(message.unwrap_or_else(|| code.to_string()))
        }
        rusqlite::Error::SqliteFailure(code, message) => ShimError::InvalidQuery {
            message: message.unwrap_or_else(|| code.to_string()),
            query: query.to_string(),
        },
        rusqlite::Error::SqlInputError { msg, .. } => ShimError::InvalidQuery {
            message: msg,
            query: query.to_string(),
        },
        rusqlite::Error::InvalidParameterCount(given, expected) => ShimError::InvalidParameters {
            message: format!("expected {} parameters, got {}", expected, given),
            params: format_values(params),
            query: query.to_string(),
        },
        rusqlite::Error::ToSqlConversionFailure(e) => ShimError::InvalidParameters {
            message: e.to_string(),
            params: format_values(params),
            query: query.to_string(),
        },
        other => ShimError::Database(other.to_string()),
    }
}
