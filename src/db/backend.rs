use super::postgres::PostgresBackend;
use super::query::{ColumnInfo, ResultSet};
use super::sqlite::SqliteBackend;
use super::value::{CellValue, Param};
use crate::config::{DatabaseConfig, Driver};
use crate::error::Result;

/// A connection that accepts psycopg-style queries (`%s` placeholders,
/// PostgreSQL dialect). A transaction is opened implicitly by the first
/// statement and lasts until `commit` or `rollback`.
#[allow(async_fn_in_trait)]
pub trait Backend {
    fn name(&self) -> &'static str;

    async fn run(&mut self, query: &str, params: Vec<Param>) -> Result<ResultSet>;

    /// Execute the same statement once per parameter row, returning the
    /// total number of affected rows.
    async fn run_many(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Roll back anything uncommitted and release the connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// The configured backend, chosen once at connect time.
pub enum Database {
    Native(PostgresBackend),
    Translating(SqliteBackend),
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let database = match config.driver {
            Driver::Postgresql => {
                Database::Native(PostgresBackend::connect(&config.postgresql).await?)
            }
            Driver::Sqlite => Database::Translating(SqliteBackend::open(&config.sqlite.path)?),
        };
        tracing::debug!(backend = database.name(), "database ready");
        Ok(database)
    }

    pub fn cursor(&mut self) -> Cursor<'_> {
        Cursor::new(self)
    }
}

impl Backend for Database {
    fn name(&self) -> &'static str {
        match self {
            Database::Native(db) => db.name(),
            Database::Translating(db) => db.name(),
        }
    }

    async fn run(&mut self, query: &str, params: Vec<Param>) -> Result<ResultSet> {
        match self {
            Database::Native(db) => db.run(query, params).await,
            Database::Translating(db) => db.run(query, params).await,
        }
    }

    async fn run_many(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<u64> {
        match self {
            Database::Native(db) => db.run_many(query, rows).await,
            Database::Translating(db) => db.run_many(query, rows).await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            Database::Native(db) => db.commit().await,
            Database::Translating(db) => db.commit().await,
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self {
            Database::Native(db) => db.rollback().await,
            Database::Translating(db) => db.rollback().await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Database::Native(db) => db.close().await,
            Database::Translating(db) => db.close().await,
        }
    }
}

/// Statement execution with row-at-a-time fetching over the last result.
pub struct Cursor<'a> {
    database: &'a mut Database,
    result: Option<ResultSet>,
    position: usize,
    rowcount: Option<u64>,
}

impl<'a> Cursor<'a> {
    fn new(database: &'a mut Database) -> Self {
        Self {
            database,
            result: None,
            position: 0,
            rowcount: None,
        }
    }

    pub async fn execute(&mut self, query: &str, params: Vec<Param>) -> Result<()> {
        self.reset();
        let result = self.database.run(query, params).await?;
        self.rowcount = result
            .affected_rows
            .or(Some(result.row_count() as u64));
        self.result = Some(result);
        Ok(())
    }

    pub async fn executemany(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<()> {
        self.reset();
        self.rowcount = Some(self.database.run_many(query, rows).await?);
        Ok(())
    }

    /// Next unread row of the last result, if any.
    pub fn fetchone(&mut self) -> Option<Vec<CellValue>> {
        let row = self.result.as_ref()?.rows.get(self.position)?.clone();
        self.position += 1;
        Some(row)
    }

    /// All unread rows of the last result.
    pub fn fetchall(&mut self) -> Vec<Vec<CellValue>> {
        let Some(result) = &self.result else {
            return Vec::new();
        };
        let rows = result.rows.get(self.position..).unwrap_or_default().to_vec();
        self.position = result.rows.len();
        rows
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        self.result.as_ref().map(|r| r.columns.as_slice()).unwrap_or_default()
    }

    pub fn result(&self) -> Option<&ResultSet> {
        self.result.as_ref()
    }

    /// Rows affected by the last statement, or rows returned by a query.
    pub fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }

    fn reset(&mut self) {
        self.result = None;
        self.position = 0;
        self.rowcount = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use pretty_assertions::assert_eq;

    async fn database() -> Database {
        let mut db = Database::Translating(SqliteBackend::open_in_memory().unwrap());
        let mut cursor = db.cursor();
        cursor
            .execute(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, active BOOLEAN)",
                vec![],
            )
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_fetchone_then_fetchall() {
        let mut db = database().await;
        let mut cursor = db.cursor();
        cursor
            .executemany(
                "INSERT INTO items (name, active) VALUES (%s, %s)",
                vec![
                    vec!["a".into(), true.into()],
                    vec!["b".into(), false.into()],
                    vec!["c".into(), true.into()],
                ],
            )
            .await
            .unwrap();
        assert_eq!(cursor.rowcount(), Some(3));

        cursor
            .execute("SELECT name FROM items ORDER BY id", vec![])
            .await
            .unwrap();
        assert_eq!(cursor.columns()[0].name, "name");
        assert_eq!(cursor.fetchone(), Some(vec![CellValue::from("a")]));
        assert_eq!(
            cursor.fetchall(),
            vec![vec![CellValue::from("b")], vec![CellValue::from("c")]]
        );
        assert_eq!(cursor.fetchone(), None);
        assert!(cursor.fetchall().is_empty());
    }

    #[tokio::test]
    async fn test_returning_id_is_fetchable() {
        let mut db = database().await;
        let mut cursor = db.cursor();
        cursor
            .execute(
                "INSERT INTO items (name, active) VALUES (%s, TRUE) RETURNING id",
                vec!["x".into()],
            )
            .await
            .unwrap();
        assert_eq!(cursor.fetchone(), Some(vec![CellValue::Int64(1)]));
    }

    #[tokio::test]
    async fn test_rollback_discards_uncommitted_rows() {
        let mut db = database().await;
        db.commit().await.unwrap();
        db.run("INSERT INTO items (name) VALUES (%s)", vec!["gone".into()])
            .await
            .unwrap();
        db.rollback().await.unwrap();

        let mut cursor = db.cursor();
        cursor
            .execute("SELECT COUNT(*) FROM items", vec![])
            .await
            .unwrap();
        assert_eq!(cursor.fetchone(), Some(vec![CellValue::Int64(0)]));
    }

    #[tokio::test]
    async fn test_connect_sqlite_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            driver: Driver::Sqlite,
            sqlite: SqliteConfig {
                path: dir.path().join("app.db"),
            },
            ..DatabaseConfig::default()
        };

        let mut db = Database::connect(&config).await.unwrap();
        assert_eq!(db.name(), "sqlite");
        db.run("CREATE TABLE t (x INTEGER)", vec![]).await.unwrap();
        db.commit().await.unwrap();
        db.close().await.unwrap();
        assert!(dir.path().join("app.db").exists());
    }
}
