use std::error::Error as StdError;
use std::time::Instant;

use bytes::BytesMut;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, Row};

use super::backend::Backend;
use super::connection::{create_client, ConnectionConfig};
use super::query::{from_pg_error, ColumnInfo, ResultSet};
use super::value::{CellValue, Param};
use crate::error::Result;
use crate::massage::{convert_placeholders, PlaceholderStyle};

/// Native backend: queries run as written, apart from placeholder syntax.
pub struct PostgresBackend {
    client: Client,
    in_transaction: bool,
}

impl PostgresBackend {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config).await?,
            in_transaction: false,
        })
    }

    async fn begin_if_needed(&mut self, query: &str) -> Result<()> {
        if !self.in_transaction {
            self.client
                .batch_execute("BEGIN")
                .await
                .map_err(|e| from_pg_error(&e, query))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end_transaction(&mut self, command: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client
                .batch_execute(command)
                .await
                .map_err(|e| from_pg_error(&e, command))?;
        }
        Ok(())
    }
}

fn to_sql_params(params: &[Param]) -> Vec<CellValue> {
    params
        .iter()
        .map(|p| match p {
            Param::Scalar(v) => v.clone(),
            Param::List(items) => CellValue::Array(items.clone()),
        })
        .collect()
}

fn param_refs(values: &[CellValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

impl Backend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    async fn run(&mut self, query: &str, params: Vec<Param>) -> Result<ResultSet> {
        let sql = convert_placeholders(query, PlaceholderStyle::Numbered);
        self.begin_if_needed(&sql).await?;

        let start = Instant::now();
        let values = to_sql_params(&params);
        let statement = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| from_pg_error(&e, &sql))?;

        if statement.columns().is_empty() {
            let affected = self
                .client
                .execute(&statement, &param_refs(&values))
                .await
                .map_err(|e| from_pg_error(&e, &sql))?;
            let mut result = ResultSet::empty();
            result.execution_time = start.elapsed();
            result.affected_rows = Some(affected);
            return Ok(result);
        }

        let rows = self
            .client
            .query(&statement, &param_refs(&values))
            .await
            .map_err(|e| from_pg_error(&e, &sql))?;
        let columns = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                type_name: col.type_().name().to_string(),
                max_width: 0,
            })
            .collect();
        Ok(ResultSet::new(columns, parse_rows(&rows), start.elapsed()))
    }

    async fn run_many(&mut self, query: &str, rows: Vec<Vec<Param>>) -> Result<u64> {
        let sql = convert_placeholders(query, PlaceholderStyle::Numbered);
        self.begin_if_needed(&sql).await?;

        let statement = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| from_pg_error(&e, &sql))?;
        let mut affected = 0;
        for row in rows {
            let values = to_sql_params(&row);
            affected += self
                .client
                .execute(&statement, &param_refs(&values))
                .await
                .map_err(|e| from_pg_error(&e, &sql))?;
        }
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn close(mut self) -> Result<()> {
        self.rollback().await
    }
}

impl ToSql for CellValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Bool(b) => b.to_sql(ty, out),
            CellValue::Int64(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            CellValue::Float64(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            CellValue::Text(s) => s.to_sql(ty, out),
            CellValue::Bytes(b) => b.to_sql(ty, out),
            CellValue::Date(d) => d.to_sql(ty, out),
            CellValue::DateTime(dt) => dt.to_sql(ty, out),
            CellValue::TimestampTz(dt) => dt.to_sql(ty, out),
            CellValue::Interval(_) => Err("interval parameters are not supported".into()),
            CellValue::Json(j) => j.to_sql(ty, out),
            CellValue::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => Err(format!("container parameter bound to non-array type {}", ty).into()),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// PostgreSQL `interval`, flattened to a duration (a month counts 30 days).
struct PgInterval(Duration);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("invalid interval length {}", raw.len()).into());
        }
        let micros = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?);
        let months = i32::from_be_bytes(raw[12..16].try_into()?);
        let total_days = i64::from(days) + i64::from(months) * 30;
        Ok(PgInterval(
            Duration::microseconds(micros) + Duration::days(total_days),
        ))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn parse_rows(rows: &[Row]) -> Vec<Vec<CellValue>> {
    rows.iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_value(row, i, col.type_()))
                .collect()
        })
        .collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    let value = match *pg_type {
        Type::BOOL => get::<bool>(row, idx).map(CellValue::Bool),
        Type::INT2 => get::<i16>(row, idx).map(|v| CellValue::Int64(v.into())),
        Type::INT4 => get::<i32>(row, idx).map(|v| CellValue::Int64(v.into())),
        Type::INT8 => get::<i64>(row, idx).map(CellValue::Int64),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| CellValue::Float64(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx).map(CellValue::Float64),
        Type::BYTEA => get::<Vec<u8>>(row, idx).map(CellValue::Bytes),
        Type::DATE => get::<NaiveDate>(row, idx).map(CellValue::Date),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).map(CellValue::DateTime),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx).map(CellValue::TimestampTz),
        Type::INTERVAL => get::<PgInterval>(row, idx).map(|v| CellValue::Interval(v.0)),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx).map(CellValue::Json),
        Type::INT4_ARRAY => get::<Vec<i32>>(row, idx)
            .map(|v| CellValue::Array(v.into_iter().map(CellValue::from).collect())),
        Type::INT8_ARRAY => get::<Vec<i64>>(row, idx)
            .map(|v| CellValue::Array(v.into_iter().map(CellValue::from).collect())),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => get::<Vec<String>>(row, idx)
            .map(|v| CellValue::Array(v.into_iter().map(CellValue::from).collect())),
        // Text, enums and anything else with a text-compatible representation.
        _ => get::<String>(row, idx).map(CellValue::Text),
    };
    value.unwrap_or(CellValue::Null)
}
