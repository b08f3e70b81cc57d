//! Statement-level helpers on top of sqlparser's PostgreSQL dialect

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::domain::result::{Error, Result};

/// Split a migration unit into its top-level statements.
///
/// Splits on semicolon tokens, so semicolons inside string literals,
/// dollar-quoted bodies and comments are left alone. Each statement is the
/// original source text, trimmed, including its terminating semicolon.
/// Segments holding only whitespace or comments are dropped.
pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| Error::validation(format!("cannot tokenize unit: {}", e)))?;

    // Byte offsets of every top-level semicolon plus whether the segment
    // before it carried anything besides whitespace.
    let mut cuts: Vec<((u64, u64), bool)> = Vec::new();
    let mut has_content = false;
    for token in &tokens {
        match &token.token {
            Token::SemiColon => {
                cuts.push(((token.span.start.line, token.span.start.column), has_content));
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }

    let offsets = byte_offsets(sql, cuts.iter().map(|(pos, _)| *pos))?;

    let mut statements = Vec::new();
    let mut start = 0;
    for (offset, (_, content)) in offsets.into_iter().zip(cuts.iter()) {
        if !sql[offset..].starts_with(';') {
            return Err(Error::validation(format!(
                "statement boundary at byte {} is not a semicolon",
                offset
            )));
        }
        if *content {
            statements.push(sql[start..=offset].trim().to_string());
        }
        start = offset + 1;
    }
    if has_content {
        statements.push(sql[start..].trim().to_string());
    }

    Ok(statements)
}

/// Translate 1-based (line, column) token positions into byte offsets.
///
/// Positions must be in ascending source order. Columns count characters,
/// the way the tokenizer advances.
fn byte_offsets(sql: &str, positions: impl Iterator<Item = (u64, u64)>) -> Result<Vec<usize>> {
    let mut positions = positions.peekable();
    let mut offsets = Vec::new();
    let (mut line, mut column) = (1u64, 1u64);

    for (idx, ch) in sql.char_indices() {
        while positions.peek() == Some(&(line, column)) {
            offsets.push(idx);
            positions.next();
        }
        if positions.peek().is_none() {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    if let Some((l, c)) = positions.next() {
        return Err(Error::validation(format!(
            "token position {}:{} is outside the unit",
            l, c
        )));
    }
    Ok(offsets)
}

/// Parse a unit with the PostgreSQL dialect, returning its statement count.
///
/// sqlparser does not cover every PostgreSQL construct, so callers treat a
/// failure here as a warning rather than proof the SQL is broken.
pub fn validate_syntax(sql: &str) -> Result<usize> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| {
        let msg = e.to_string();
        Error::validation(msg.trim_start_matches("sql parser error: ").to_string())
    })?;
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let stmts = split_statements("CREATE TABLE a (id int);\nCREATE TABLE b (id int);\n").unwrap();
        assert_eq!(
            stmts,
            vec!["CREATE TABLE a (id int);", "CREATE TABLE b (id int);"]
        );
    }

    #[test]
    fn test_split_keeps_trailing_statement_without_semicolon() {
        let stmts = split_statements("SELECT 1;\nSELECT 2").unwrap();
        assert_eq!(stmts, vec!["SELECT 1;", "SELECT 2"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_strings_and_comments() {
        let sql = "-- note; not a boundary\nINSERT INTO t VALUES ('a;b');\nSELECT 2;";
        let stmts = split_statements(sql).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "-- note; not a boundary\nINSERT INTO t VALUES ('a;b');");
        assert_eq!(stmts[1], "SELECT 2;");
    }

    #[test]
    fn test_split_keeps_dollar_quoted_bodies_whole() {
        let sql = "CREATE FUNCTION f() RETURNS trigger LANGUAGE plpgsql AS $$\nBEGIN\n    NEW.x := 1;\n    RETURN NEW;\nEND;\n$$;\nSELECT 1;";
        let stmts = split_statements(sql).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("RETURN NEW;"));
        assert!(stmts[0].ends_with("$$;"));
    }

    #[test]
    fn test_split_handles_multibyte_text() {
        let sql = "COMMENT ON TABLE t IS 'organização';\nSELECT 'é';";
        let stmts = split_statements(sql).unwrap();
        assert_eq!(stmts, vec!["COMMENT ON TABLE t IS 'organização';", "SELECT 'é';"]);
    }

    #[test]
    fn test_split_drops_empty_segments() {
        let stmts = split_statements(";;\n-- only a comment\n;SELECT 1;").unwrap();
        assert_eq!(stmts, vec!["SELECT 1;"]);
    }

    #[test]
    fn test_split_store_units() {
        for phase in crate::migrations::phases().unwrap() {
            for unit in &phase.units {
                let stmts = split_statements(&unit.sql).unwrap();
                assert!(!stmts.is_empty(), "{} has no statements", unit.name);
            }
        }
    }

    #[test]
    fn test_validate_syntax() {
        assert_eq!(validate_syntax("SELECT 1; SELECT 2;").unwrap(), 2);
        let err = validate_syntax("SELEC * FROM t").unwrap_err().to_string();
        assert!(!err.contains("sql parser error:"), "Error was: {}", err);
    }
}
