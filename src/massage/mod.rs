//! Runtime query massaging.
//!
//! Every query bound for the translating backend passes through this
//! pipeline immediately before execution:
//!
//! ```text
//! (query, params)
//!       ↓  strip NULLS FIRST / NULLS LAST        → flag
//!       ↓  expand = ANY (%s) into IN (?, ...)     → params flattened in lockstep
//!       ↓  strip trailing RETURNING id           → flag
//!       ↓  %s → ?, tokenize, fixed rewrite rules
//! (query', params', flags)
//! ```
//!
//! Each stage is a pure transform and can be used on its own.

mod placeholders;

pub use placeholders::{convert_placeholders, PlaceholderStyle};

use regex::Regex;

use crate::db::{format_params, CellValue, Param};
use crate::error::{Result, ShimError};
use crate::rewrite::{join, tokenize, RuleSet};

/// Rewrites applied, in order, to every tokenized query.
const QUERY_RULES: &[(&str, &str, &str)] = &[
    (
        "epoch_since",
        "EXTRACT ('epoch' FROM NOW() - $1)",
        "strftime('%s', 'now') - strftime('%s', $1)",
    ),
    (
        "epoch_until_min",
        "EXTRACT ('epoch' FROM (MIN($1) - NOW()))",
        "strftime('%s', MIN($1)) - strftime('%s', 'now')",
    ),
    ("now", "NOW()", "cast(strftime('%s', 'now') as integer)"),
    ("true", "TRUE", "1"),
    ("false", "FALSE", "0"),
    ("one_day", "'1 day'", "86400"),
    ("next_as_text", "next::text", "datetime(next, 'unixepoch')"),
    ("quote_commit", "commit", "\"commit\""),
    ("quote_transaction", "transaction", "\"transaction\""),
    ("suppress_md5", "MD5($1)", "$1"),
    ("fetch_first_row", "FETCH FIRST ROW ONLY", ""),
    ("chaincomments", "chaincomments(commentchains.id)", "0"),
    ("chainunread", "chainunread(commentchains.id, ?)", "ifnull(0, ?)"),
    ("character_length", "character_length(", "length("),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// Out-of-band facts recorded while massaging a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// A `NULLS FIRST` / `NULLS LAST` hint was removed. The ordering itself
    /// is not reproduced.
    pub nulls: Option<NullsOrder>,
    /// A trailing `RETURNING id` was removed; the caller must fetch the last
    /// inserted row id after executing.
    pub returning_id: bool,
}

/// A query ready for the translating backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Massaged {
    pub query: String,
    pub params: Vec<CellValue>,
    pub flags: QueryFlags,
}

#[derive(Debug, Clone)]
pub struct QueryMassager {
    nulls_first: Regex,
    nulls_last: Regex,
    any_placeholder: Regex,
    other_any: Regex,
    returning_id: Regex,
    rules: RuleSet,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| ShimError::InvalidRule {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

impl QueryMassager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            nulls_first: compile(r"(?i)\s+NULLS\s+FIRST\b")?,
            nulls_last: compile(r"(?i)\s+NULLS\s+LAST\b")?,
            any_placeholder: compile(r"(?i)(^|[^!<>\s])\s*=\s*ANY\s*\(\s*%s\s*\)")?,
            other_any: compile(r"(?i)[!<>]\s*=?\s*ANY\s*\(\s*%s\s*\)")?,
            returning_id: compile(r"(?i)\s+RETURNING\s+id\s*$")?,
            rules: RuleSet::from_table(QUERY_RULES)?,
        })
    }

    /// Run the full pipeline.
    pub fn massage(&self, query: &str, params: Vec<Param>) -> Result<Massaged> {
        let mut flags = QueryFlags::default();

        let (query, nulls) = self.strip_nulls_ordering(query);
        flags.nulls = nulls;

        let (query, params) = self.expand_any(&query, params)?;

        let (query, returning_id) = self.strip_returning_id(&query);
        flags.returning_id = returning_id;

        let query = self.translate(&query);
        let params = flatten(&query, params)?;

        tracing::debug!(query = %query, ?flags, "massaged query");
        Ok(Massaged {
            query,
            params,
            flags,
        })
    }

    /// Massage a query once per parameter row. Every row must yield the same
    /// query text.
    pub fn massage_many(
        &self,
        query: &str,
        rows: Vec<Vec<Param>>,
    ) -> Result<(String, Vec<Vec<CellValue>>, QueryFlags)> {
        let mut massaged_query: Option<(String, QueryFlags)> = None;
        let mut massaged_rows = Vec::with_capacity(rows.len());

        for row in rows {
            let massaged = self.massage(query, row)?;
            match &massaged_query {
                Some((first, _)) if *first != massaged.query => {
                    return Err(ShimError::translation(format!(
                        "parameter rows produce different queries: {:?} vs {:?}",
                        first, massaged.query
                    )));
                }
                Some(_) => {}
                None => massaged_query = Some((massaged.query, massaged.flags)),
            }
            massaged_rows.push(massaged.params);
        }

        let (query, flags) = match massaged_query {
            Some(found) => found,
            None => {
                let (query, nulls) = self.strip_nulls_ordering(query);
                let (query, returning_id) = self.strip_returning_id(&query);
                (self.translate(&query), QueryFlags { nulls, returning_id })
            }
        };
        Ok((query, massaged_rows, flags))
    }

    /// Remove `NULLS FIRST`, or failing that `NULLS LAST`, everywhere in the
    /// query and report which one was requested.
    pub fn strip_nulls_ordering(&self, query: &str) -> (String, Option<NullsOrder>) {
        if self.nulls_first.is_match(query) {
            (self.nulls_first.replace_all(query, "").into_owned(), Some(NullsOrder::First))
        } else if self.nulls_last.is_match(query) {
            (self.nulls_last.replace_all(query, "").into_owned(), Some(NullsOrder::Last))
        } else {
            (query.to_string(), None)
        }
    }

    /// Replace each `= ANY (%s)` with `IN (?, ...)` sized to the next
    /// container parameter, splicing the container's elements into the
    /// parameter list in its place. Any other comparison against
    /// `ANY (%s)` has no `IN` equivalent and is rejected.
    pub fn expand_any(&self, query: &str, mut params: Vec<Param>) -> Result<(String, Vec<Param>)> {
        if let Some(found) = self.other_any.find(query) {
            return Err(ShimError::translation(format!(
                "unsupported comparison {:?} in {:?}",
                found.as_str(),
                query
            )));
        }

        let mut query = query.to_string();

        while let Some(caps) = self.any_placeholder.captures(&query) {
            let Some(whole) = caps.get(0) else {
                break;
            };
            let range = whole.range();
            let lead = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let Some((index, items)) = params.iter().enumerate().find_map(|(i, p)| match p {
                Param::List(items) => Some((i, items.clone())),
                Param::Scalar(_) => None,
            }) else {
                return Err(ShimError::translation(format!(
                    "no container parameter left for '= ANY (%s)' in {:?}",
                    query
                )));
            };

            let placeholders = vec!["?"; items.len()].join(", ");
            query.replace_range(range, &format!("{} IN ({})", lead, placeholders));
            params.splice(index..=index, items.into_iter().map(Param::Scalar));
        }

        Ok((query, params))
    }

    /// Remove a trailing `RETURNING id`.
    pub fn strip_returning_id(&self, query: &str) -> (String, bool) {
        match self.returning_id.find(query) {
            Some(found) => (query[..found.start()].to_string(), true),
            None => (query.to_string(), false),
        }
    }

    /// Normalize placeholders to `?`, tokenize and apply the rewrite rules.
    pub fn translate(&self, query: &str) -> String {
        let mut tokens = tokenize(&convert_placeholders(query, PlaceholderStyle::Question));
        self.rules.apply(&mut tokens);
        join(&tokens)
    }
}

/// Every container must have been consumed by an `ANY` expansion.
fn flatten(query: &str, params: Vec<Param>) -> Result<Vec<CellValue>> {
    if params.iter().any(Param::is_list) {
        return Err(ShimError::InvalidParameters {
            message: "container parameter without a matching '= ANY (%s)'".to_string(),
            params: format_params(&params),
            query: query.to_string(),
        });
    }
    Ok(params
        .into_iter()
        .filter_map(|p| match p {
            Param::Scalar(v) => Some(v),
            Param::List(_) => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn massager() -> QueryMassager {
        QueryMassager::new().unwrap()
    }

    #[test]
    fn test_strip_nulls_last() {
        let (query, nulls) = massager().strip_nulls_ordering("SELECT x FROM t ORDER BY x NULLS LAST");
        assert_eq!(query, "SELECT x FROM t ORDER BY x");
        assert_eq!(nulls, Some(NullsOrder::Last));
    }

    #[test]
    fn test_strip_nulls_first_takes_precedence() {
        let (query, nulls) =
            massager().strip_nulls_ordering("ORDER BY a NULLS FIRST, b nulls first");
        assert_eq!(query, "ORDER BY a, b");
        assert_eq!(nulls, Some(NullsOrder::First));
    }

    #[test]
    fn test_no_nulls_hint() {
        let (query, nulls) = massager().strip_nulls_ordering("SELECT nulls_count FROM t");
        assert_eq!(query, "SELECT nulls_count FROM t");
        assert_eq!(nulls, None);
    }

    #[test]
    fn test_expand_any() {
        let (query, params) = massager()
            .expand_any("SELECT * FROM t WHERE col = ANY (%s)", vec![Param::list([1i64, 2, 3])])
            .unwrap();
        assert_eq!(query, "SELECT * FROM t WHERE col IN (?, ?, ?)");
        assert_eq!(params, vec![Param::from(1i64), Param::from(2i64), Param::from(3i64)]);
    }

    #[test]
    fn test_expand_any_keeps_surrounding_params_in_order() {
        let (query, params) = massager()
            .expand_any(
                "SELECT * FROM t WHERE a=%s AND b=ANY (%s) AND c = any(%s) AND d=%s",
                vec![
                    Param::from("a"),
                    Param::list(["b1", "b2"]),
                    Param::list(["c1"]),
                    Param::from("d"),
                ],
            )
            .unwrap();
        assert_eq!(query, "SELECT * FROM t WHERE a=%s AND b IN (?, ?) AND c IN (?) AND d=%s");
        assert_eq!(
            params,
            vec![
                Param::from("a"),
                Param::from("b1"),
                Param::from("b2"),
                Param::from("c1"),
                Param::from("d"),
            ]
        );
    }

    #[test]
    fn test_expand_any_without_container_is_fatal() {
        let err = massager()
            .expand_any("SELECT * FROM t WHERE id = ANY (%s)", vec![Param::from(1i64)])
            .unwrap_err();
        assert!(matches!(err, ShimError::Translation(_)));
    }

    #[test]
    fn test_expand_any_rejects_other_comparisons() {
        let m = massager();
        for query in [
            "SELECT id FROM t WHERE id <= ANY (%s)",
            "SELECT id FROM t WHERE id >= ANY (%s)",
            "SELECT id FROM t WHERE id != ANY (%s)",
            "SELECT id FROM t WHERE id <> ANY (%s)",
            "SELECT id FROM t WHERE id < any(%s)",
        ] {
            let err = m.expand_any(query, vec![Param::list([1i64])]).unwrap_err();
            assert!(matches!(err, ShimError::Translation(_)), "{}: {}", query, err);
        }
    }

    #[test]
    fn test_massage_rejects_ordered_any() {
        let err = massager()
            .massage("SELECT id FROM t WHERE id <= ANY (%s)", vec![Param::list([1i64])])
            .unwrap_err();
        assert!(matches!(err, ShimError::Translation(_)));
    }

    #[test]
    fn test_strip_returning_id() {
        let m = massager();
        assert_eq!(
            m.strip_returning_id("INSERT INTO t (a) VALUES (%s) RETURNING id"),
            ("INSERT INTO t (a) VALUES (%s)".to_string(), true)
        );
        assert_eq!(
            m.strip_returning_id("INSERT INTO t (a) VALUES (%s) RETURNING name"),
            ("INSERT INTO t (a) VALUES (%s) RETURNING name".to_string(), false)
        );
    }

    #[test]
    fn test_translate_rules() {
        let m = massager();
        assert_eq!(
            m.translate("SELECT EXTRACT('epoch' FROM NOW() - time) FROM t"),
            "SELECT strftime ( '%s' , 'now' ) - strftime ( '%s' , time ) FROM t"
        );
        assert_eq!(
            m.translate("SELECT EXTRACT ('epoch' FROM (MIN(next) - NOW())) FROM t"),
            "SELECT strftime ( '%s' , MIN ( next ) ) - strftime ( '%s' , 'now' ) FROM t"
        );
        assert_eq!(
            m.translate("UPDATE t SET seen=NOW(), done=TRUE WHERE old=FALSE"),
            "UPDATE t SET seen = cast ( strftime ( '%s' , 'now' ) as integer ) , done = 1 WHERE old = 0"
        );
        assert_eq!(
            m.translate("SELECT next::text FROM timers WHERE delay > '1 day'"),
            "SELECT datetime ( next , 'unixepoch' ) FROM timers WHERE delay > 86400"
        );
    }

    #[test]
    fn test_translate_compat_shims() {
        let m = massager();
        assert_eq!(
            m.translate("SELECT commit FROM changesets WHERE transaction=%s"),
            "SELECT \"commit\" FROM changesets WHERE \"transaction\" = ?"
        );
        assert_eq!(
            m.translate("SELECT id FROM users WHERE password=MD5(%s)"),
            "SELECT id FROM users WHERE password = ?"
        );
        assert_eq!(
            m.translate("SELECT id FROM t ORDER BY id FETCH FIRST ROW ONLY"),
            "SELECT id FROM t ORDER BY id"
        );
        assert_eq!(
            m.translate("SELECT chaincomments(commentchains.id), chainunread(commentchains.id, %s) FROM commentchains"),
            "SELECT 0 , ifnull ( 0 , ? ) FROM commentchains"
        );
        assert_eq!(
            m.translate("SELECT character_length(name) FROM users"),
            "SELECT length ( name ) FROM users"
        );
    }

    #[test]
    fn test_massage_pipeline() {
        let massaged = massager()
            .massage(
                "SELECT id FROM t WHERE id = ANY (%s) AND ok=TRUE ORDER BY x NULLS LAST",
                vec![Param::list([1i64, 2, 3])],
            )
            .unwrap();
        assert_eq!(
            massaged.query,
            "SELECT id FROM t WHERE id IN ( ? , ? , ? ) AND ok = 1 ORDER BY x"
        );
        assert_eq!(
            massaged.params,
            vec![CellValue::Int64(1), CellValue::Int64(2), CellValue::Int64(3)]
        );
        assert_eq!(massaged.flags.nulls, Some(NullsOrder::Last));
        assert!(!massaged.flags.returning_id);
    }

    #[test]
    fn test_massage_returning_id() {
        let massaged = massager()
            .massage("INSERT INTO t (name) VALUES (%s) RETURNING id", vec![Param::from("x")])
            .unwrap();
        assert_eq!(massaged.query, "INSERT INTO t ( name ) VALUES ( ? )");
        assert!(massaged.flags.returning_id);
    }

    #[test]
    fn test_massage_rejects_unconsumed_container() {
        let err = massager()
            .massage("SELECT * FROM t WHERE id=%s", vec![Param::list([1i64])])
            .unwrap_err();
        assert!(matches!(err, ShimError::InvalidParameters { .. }));
    }

    #[test]
    fn test_massage_many() {
        let (query, rows, flags) = massager()
            .massage_many(
                "INSERT INTO t (a, b) VALUES (%s, %s)",
                vec![
                    vec![Param::from(1i64), Param::from(true)],
                    vec![Param::from(2i64), Param::from(false)],
                ],
            )
            .unwrap();
        assert_eq!(query, "INSERT INTO t ( a , b ) VALUES ( ? , ? )");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![CellValue::Int64(2), CellValue::Bool(false)]);
        assert_eq!(flags, QueryFlags::default());
    }

    #[test]
    fn test_massage_many_rejects_divergent_rows() {
        let err = massager()
            .massage_many(
                "SELECT * FROM t WHERE id = ANY (%s)",
                vec![vec![Param::list([1i64])], vec![Param::list([1i64, 2])]],
            )
            .unwrap_err();
        assert!(matches!(err, ShimError::Translation(_)));
    }
}
