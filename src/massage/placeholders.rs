/// Target syntax for psycopg-style `%s` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (SQLite).
    Question,
    /// `$1`, `$2`, ... (PostgreSQL wire protocol).
    Numbered,
}

/// Rewrite every `%s` to the target placeholder syntax and every `%%` to a
/// literal `%`. Any other `%` sequence is left untouched.
pub fn convert_placeholders(query: &str, style: PlaceholderStyle) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut index = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                index += 1;
                match style {
                    PlaceholderStyle::Question => out.push('?'),
                    PlaceholderStyle::Numbered => {
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                }
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }

    out
}
