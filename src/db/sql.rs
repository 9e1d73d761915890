//! Statement helpers shared by both store backends.
//!
//! Templates use `?` placeholders. PostgreSQL wants `$1..$n`; SQLite takes
//! `?` as-is but needs the statement split apart to emulate `RETURNING`.

/// Byte offsets in `sql` that are outside quoted literals and identifiers.
fn unquoted_offsets(sql: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quote: Option<char> = None;
    sql.char_indices().filter(move |&(_, c)| match quote {
        Some(q) => {
            if c == q {
                quote = None;
            }
            false
        }
        None => {
            if c == '\'' || c == '"' {
                quote = Some(c);
                false
            } else {
                true
            }
        }
    })
}

/// Rewrite `?` placeholders to `$1, $2, ...` in left-to-right order.
pub fn numbered_placeholders(sql: &str) -> String {
    let positions: Vec<usize> = unquoted_offsets(sql)
        .filter(|&(_, c)| c == '?')
        .map(|(i, _)| i)
        .collect();

    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, pos) in positions.iter().enumerate() {
        out.push_str(&sql[last..*pos]);
        out.push('$');
        out.push_str(&(n + 1).to_string());
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    out
}

/// Number of `?` placeholders outside quoted text.
pub fn count_placeholders(sql: &str) -> usize {
    unquoted_offsets(sql).filter(|&(_, c)| c == '?').count()
}

/// Offset of a top-level keyword (case-insensitive, whole word, unquoted).
fn find_keyword(sql: &str, keyword: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    unquoted_offsets(sql).map(|(i, _)| i).find(|&i| {
        let end = i + keyword.len();
        end <= sql.len()
            && sql.is_char_boundary(end)
            && sql[i..end].eq_ignore_ascii_case(keyword)
            && (i == 0 || !is_word(bytes[i - 1]))
            && (end == sql.len() || !is_word(bytes[end]))
    })
}

/// Identifier immediately following `offset`, skipping whitespace.
fn identifier_after(sql: &str, offset: usize) -> Option<&str> {
    let rest = sql[offset..].trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .unwrap_or(rest.len());
    let ident = &rest[..end];
    (!ident.is_empty()).then_some(ident)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// A statement template split into the parts the gateway cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'a> {
    pub kind: StatementKind,
    /// The statement without its `RETURNING` clause.
    pub body: &'a str,
    /// Column list of the `RETURNING` clause, if any.
    pub returning: Option<&'a str>,
    pub table: Option<&'a str>,
}

impl<'a> Statement<'a> {
    pub fn parse(sql: &'a str) -> Self {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        let first = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let kind = match first.as_str() {
            "SELECT" | "WITH" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Other,
        };

        let (body, returning) = match kind {
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                match find_keyword(trimmed, "RETURNING") {
                    Some(at) => (
                        trimmed[..at].trim_end(),
                        Some(trimmed[at + "RETURNING".len()..].trim()),
                    ),
                    None => (trimmed, None),
                }
            }
            _ => (trimmed, None),
        };

        let table = match kind {
            StatementKind::Insert => {
                find_keyword(body, "INTO").and_then(|at| identifier_after(body, at + 4))
            }
            StatementKind::Update => identifier_after(body, "UPDATE".len()),
            StatementKind::Delete => {
                find_keyword(body, "FROM").and_then(|at| identifier_after(body, at + 4))
            }
            _ => None,
        };

        Self {
            kind,
            body,
            returning,
            table,
        }
    }

    /// Whether the caller expects rows back.
    pub fn yields_rows(&self) -> bool {
        self.kind == StatementKind::Select || self.returning.is_some()
    }

    /// Text after the top-level `WHERE` keyword of the body.
    pub fn where_clause(&self) -> Option<&'a str> {
        find_keyword(self.body, "WHERE").map(|at| self.body[at + "WHERE".len()..].trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_in_order() {
        assert_eq!(
            numbered_placeholders("INSERT INTO t (a, b, c) VALUES (?, ?, ?)"),
            "INSERT INTO t (a, b, c) VALUES ($1, $2, $3)"
        );
        assert_eq!(
            numbered_placeholders("UPDATE t SET a = a + 1 WHERE id = ? RETURNING *"),
            "UPDATE t SET a = a + 1 WHERE id = $1 RETURNING *"
        );
    }

    #[test]
    fn quoted_question_marks_are_left_alone() {
        let sql = "SELECT * FROM t WHERE note = 'why?' AND id = ? AND \"odd?col\" = ?";
        assert_eq!(
            numbered_placeholders(sql),
            "SELECT * FROM t WHERE note = 'why?' AND id = $1 AND \"odd?col\" = $2"
        );
        assert_eq!(count_placeholders(sql), 2);
    }

    #[test]
    fn insert_with_returning_is_split() {
        let stmt = Statement::parse(
            "INSERT INTO signals (symbol, type) VALUES (?, ?) RETURNING id",
        );
        assert_eq!(stmt.kind, StatementKind::Insert);
        assert_eq!(stmt.table, Some("signals"));
        assert_eq!(stmt.returning, Some("id"));
        assert_eq!(
            stmt.body,
            "INSERT INTO signals (symbol, type) VALUES (?, ?)"
        );
        assert!(stmt.yields_rows());
    }

    #[test]
    fn update_exposes_where_clause() {
        let stmt =
            Statement::parse("update signals set agree_count = agree_count + 1 where id = ? returning *;");
        assert_eq!(stmt.kind, StatementKind::Update);
        assert_eq!(stmt.table, Some("signals"));
        assert_eq!(stmt.returning, Some("*"));
        assert_eq!(stmt.where_clause(), Some("id = ?"));
    }

    #[test]
    fn returning_inside_literal_is_not_a_clause() {
        let stmt = Statement::parse("INSERT INTO notes (body) VALUES ('returning soon')");
        assert_eq!(stmt.returning, None);
        assert!(!stmt.yields_rows());
    }

    #[test]
    fn column_named_like_keyword_prefix_is_not_matched() {
        let stmt = Statement::parse("UPDATE t SET returning_user = ? WHERE id = ?");
        assert_eq!(stmt.returning, None);
        assert_eq!(stmt.where_clause(), Some("id = ?"));
    }

    #[test]
    fn selects_always_yield_rows() {
        let stmt = Statement::parse("  SELECT COUNT(*) AS count FROM trades");
        assert_eq!(stmt.kind, StatementKind::Select);
        assert!(stmt.yields_rows());
        assert_eq!(stmt.table, None);
    }
}
