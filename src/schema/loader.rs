use std::path::Path;

use crate::error::Result;

/// Split a schema script into trimmed, comment-free statements.
///
/// Everything after `--` on a line is discarded, blank lines are dropped, the
/// surviving fragments are joined with spaces and the result is split on `;`.
pub fn split_statements(script: &str) -> Vec<String> {
    let joined = script
        .lines()
        .filter_map(|line| {
            let fragment = match line.find("--") {
                Some(pos) => &line[..pos],
                None => line,
            };
            let fragment = fragment.trim();
            (!fragment.is_empty()).then_some(fragment)
        })
        .collect::<Vec<_>>()
        .join(" ");

    joined
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load every file in order and concatenate their statements.
pub fn load_statements<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)?;
        let before = statements.len();
        statements.extend(split_statements(&script));
        tracing::debug!(
            file = %path.display(),
            statements = statements.len() - before,
            "loaded schema file"
        );
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_split_simple() {
        assert_eq!(
            split_statements("CREATE TABLE a (x int);\nCREATE TABLE b (y int);"),
            vec!["CREATE TABLE a (x int)", "CREATE TABLE b (y int)"]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_are_dropped() {
        let script = "-- header comment\n\nCREATE TABLE a ( -- the table\n  x int  -- column\n);\n\n";
        assert_eq!(split_statements(script), vec!["CREATE TABLE a ( x int )"]);
    }

    #[test]
    fn test_statement_spanning_lines_is_joined_with_spaces() {
        let script = "INSERT INTO t\nVALUES (1,\n2);";
        assert_eq!(split_statements(script), vec!["INSERT INTO t VALUES (1, 2)"]);
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        assert_eq!(split_statements(";;  ; SET x = 1;;"), vec!["SET x = 1"]);
    }

    #[test]
    fn test_load_concatenates_files_in_order() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "CREATE TYPE s AS ENUM ('a');").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "CREATE TABLE t (c s);\nALTER TABLE t ADD x;").unwrap();

        let statements = load_statements(&[first.path(), second.path()]).unwrap();
        assert_eq!(
            statements,
            vec!["CREATE TYPE s AS ENUM ('a')", "CREATE TABLE t (c s)", "ALTER TABLE t ADD x"]
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_statements(&["/nonexistent/schema.sql"]);
        assert!(matches!(result, Err(crate::error::ShimError::Io(_))));
    }
}
