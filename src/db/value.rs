use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// A single column value, as bound to or fetched from either backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(Duration),
    Json(serde_json::Value),
    Array(Vec<CellValue>),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bytes(b) => format!("[{} bytes]", b.len()),
            CellValue::Date(d) => d.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_string(),
            CellValue::Interval(d) => format!("{}s", d.num_seconds()),
            CellValue::Json(j) => j.to_string(),
            CellValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.display()).collect();
                format!("{{{}}}", items.join(", "))
            }
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }

    /// Literal-style rendering used in diagnostics: text is quoted.
    fn debug_literal(&self) -> String {
        match self {
            CellValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            other => other.display(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int64(i),
                None => n.as_f64().map(CellValue::Float64).unwrap_or(CellValue::Null),
            },
            serde_json::Value::String(s) => CellValue::Text(s),
            serde_json::Value::Array(items) => {
                CellValue::Array(items.into_iter().map(CellValue::from_json).collect())
            }
            object @ serde_json::Value::Object(_) => CellValue::Json(object),
        }
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int64(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int64(v.into())
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float64(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        CellValue::DateTime(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// One entry of a query's parameter list.
///
/// A `List` is a multi-valued container; on the translating backend it is
/// only valid where the query has a matching `= ANY (%s)` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(CellValue),
    List(Vec<CellValue>),
}

impl Param {
    pub fn list<T: Into<CellValue>>(items: impl IntoIterator<Item = T>) -> Self {
        Param::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Param::List(_))
    }

    /// JSON arrays become containers; everything else is a scalar.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                Param::List(items.into_iter().map(CellValue::from_json).collect())
            }
            other => Param::Scalar(CellValue::from_json(other)),
        }
    }

    fn debug_literal(&self) -> String {
        match self {
            Param::Scalar(v) => v.debug_literal(),
            Param::List(items) => format_values(items),
        }
    }
}

macro_rules! scalar_param {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Param {
                fn from(v: $t) -> Self {
                    Param::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_param!(CellValue, bool, i64, i32, f64, &str, String, NaiveDateTime);

impl<T: Into<CellValue>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        Param::Scalar(v.into())
    }
}

/// Parse a JSON array of parameters, e.g. `[1, "x", [2, 3]]`.
pub fn params_from_json(text: &str) -> serde_json::Result<Vec<Param>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(text)?;
    Ok(values.into_iter().map(Param::from_json).collect())
}

pub fn format_values(values: &[CellValue]) -> String {
    let items: Vec<String> = values.iter().map(CellValue::debug_literal).collect();
    format!("[{}]", items.join(", "))
}

pub fn format_params(params: &[Param]) -> String {
    let items: Vec<String> = params.iter().map(Param::debug_literal).collect();
    format!("[{}]", items.join(", "))
}

/// Decode a value stored by the translating backend according to the
/// column's declared type. Temporal values are stored either as epoch
/// seconds or as formatted text; booleans as integers.
pub fn decode_declared(decl_type: &str, raw: CellValue) -> CellValue {
    if raw == CellValue::Null {
        return raw;
    }
    let base = decl_type
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    match base.as_str() {
        "DATE" => decode_date(raw),
        "TIMESTAMP" => decode_timestamp(raw),
        "INTERVAL" => decode_interval(raw),
        "BOOLEAN" => decode_boolean(raw),
        _ => raw,
    }
}

fn as_integer(raw: &CellValue) -> Option<i64> {
    match raw {
        CellValue::Int64(i) => Some(*i),
        CellValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn from_epoch(seconds: i64) -> Option<CellValue> {
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|dt| CellValue::DateTime(dt.naive_utc()))
}

pub fn decode_date(raw: CellValue) -> CellValue {
    if let Some(value) = as_integer(&raw).and_then(from_epoch) {
        return value;
    }
    if let CellValue::Text(s) = &raw {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return CellValue::Date(date);
        }
    }
    raw
}

pub fn decode_timestamp(raw: CellValue) -> CellValue {
    if let Some(value) = as_integer(&raw).and_then(from_epoch) {
        return value;
    }
    if let CellValue::Text(s) = &raw {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S") {
            return CellValue::DateTime(dt);
        }
    }
    raw
}

/// Undecodable intervals read as zero.
pub fn decode_interval(raw: CellValue) -> CellValue {
    let seconds = as_integer(&raw).unwrap_or(0);
    CellValue::Interval(Duration::seconds(seconds))
}

pub fn decode_boolean(raw: CellValue) -> CellValue {
    match as_integer(&raw) {
        Some(i) => CellValue::Bool(i != 0),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, mi, s).unwrap())
    }

    #[test]
    fn test_display() {
        assert_eq!(CellValue::Null.display(), "NULL");
        assert_eq!(CellValue::Bool(true).display(), "true");
        assert_eq!(CellValue::Int64(-100).display(), "-100");
        assert_eq!(CellValue::Bytes(vec![1, 2, 3]).display(), "[3 bytes]");
        assert_eq!(CellValue::Interval(Duration::seconds(90)).display(), "90s");
        let arr = CellValue::Array(vec![CellValue::Int64(1), CellValue::Int64(2)]);
        assert_eq!(arr.display(), "{1, 2}");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(CellValue::Null.display_width(), 4);
        assert_eq!(CellValue::Text("hello".into()).display_width(), 5);
    }

    #[test]
    fn test_params_from_json() {
        let params = params_from_json(r#"[1, "x", [2, 3], null, true, 1.5]"#).unwrap();
        assert_eq!(
            params,
            vec![
                Param::from(1i64),
                Param::from("x"),
                Param::list([2i64, 3]),
                Param::Scalar(CellValue::Null),
                Param::from(true),
                Param::from(1.5),
            ]
        );
    }

    #[test]
    fn test_params_from_json_rejects_non_array() {
        assert!(params_from_json("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_format_params() {
        let params = vec![Param::from("it's"), Param::list([1i64, 2]), Param::from(None::<i64>)];
        assert_eq!(format_params(&params), "['it''s', [1, 2], NULL]");
    }

    #[test]
    fn test_decode_timestamp_from_epoch() {
        assert_eq!(
            decode_declared("TIMESTAMP", CellValue::Int64(0)),
            CellValue::DateTime(ts(1970, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            decode_declared("timestamp", CellValue::Text("86400".into())),
            CellValue::DateTime(ts(1970, 1, 2, 0, 0, 0))
        );
    }

    #[test]
    fn test_decode_timestamp_from_text() {
        assert_eq!(
            decode_timestamp(CellValue::Text("2012-03-04 05:06:07".into())),
            CellValue::DateTime(ts(2012, 3, 4, 5, 6, 7))
        );
    }

    #[test]
    fn test_decode_date() {
        assert_eq!(
            decode_declared("DATE", CellValue::Text("2012-03-04".into())),
            CellValue::Date(NaiveDate::from_ymd_opt(2012, 3, 4).unwrap())
        );
        assert_eq!(
            decode_date(CellValue::Text("not a date".into())),
            CellValue::Text("not a date".into())
        );
    }

    #[test]
    fn test_decode_interval() {
        assert_eq!(
            decode_declared("INTERVAL", CellValue::Int64(3600)),
            CellValue::Interval(Duration::seconds(3600))
        );
        assert_eq!(
            decode_interval(CellValue::Text("1 day".into())),
            CellValue::Interval(Duration::zero())
        );
    }

    #[test]
    fn test_decode_boolean() {
        assert_eq!(decode_declared("BOOLEAN", CellValue::Int64(1)), CellValue::Bool(true));
        assert_eq!(decode_declared("BOOLEAN", CellValue::Int64(0)), CellValue::Bool(false));
    }

    #[test]
    fn test_decode_leaves_other_types_and_nulls() {
        assert_eq!(decode_declared("INTEGER", CellValue::Int64(5)), CellValue::Int64(5));
        assert_eq!(decode_declared("TIMESTAMP", CellValue::Null), CellValue::Null);
        assert_eq!(
            decode_declared("VARCHAR(10)", CellValue::Text("x".into())),
            CellValue::Text("x".into())
        );
    }
}
