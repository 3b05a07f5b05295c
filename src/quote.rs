//! Identifier and literal quoting for SQL text built at runtime.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

const RESERVED_WORDS: &str = "ABORT ACTION ADD AFTER ALL ALTER ANALYZE AND AS ASC ATTACH
    AUTOINCREMENT BEFORE BEGIN BETWEEN BY CASCADE CASE CAST CHECK COLLATE COLUMN COMMIT
    CONFLICT CONSTRAINT CREATE CROSS CURRENT_DATE CURRENT_TIME CURRENT_TIMESTAMP DATABASE
    DEFAULT DEFERRABLE DEFERRED DELETE DESC DETACH DISTINCT DROP EACH ELSE END ESCAPE EXCEPT
    EXCLUSIVE EXISTS EXPLAIN FAIL FOR FOREIGN FROM FULL GLOB GROUP HAVING IF IGNORE IMMEDIATE
    IN INDEX INDEXED INITIALLY INNER INSERT INSTEAD INTERSECT INTO IS ISNULL JOIN KEY LEFT LIKE
    LIMIT MATCH NATURAL NO NOT NOTNULL NULL OF OFFSET ON OR ORDER OUTER PLAN PRAGMA PRIMARY
    QUERY RAISE RECURSIVE REFERENCES REGEXP REINDEX RELEASE RENAME REPLACE RESTRICT RIGHT
    ROLLBACK ROW SAVEPOINT SELECT SET TABLE TEMP TEMPORARY THEN TO TRANSACTION TRIGGER UNION
    UNIQUE UPDATE USING VACUUM VALUES VIEW VIRTUAL WHEN WHERE WITH WITHOUT";

static RESERVED: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| RESERVED_WORDS.split_whitespace().collect());

static BARE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("bare identifier pattern is valid")
});

static SCHEMA_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[A-Za-z][A-Za-z0-9_-]+$").expect("schema name pattern is valid")
});

/// Whether `value` (case-insensitive, surrounding whitespace ignored) is an SQL keyword.
#[must_use]
pub fn is_reserved_word(value: &str) -> bool {
    RESERVED.contains(value.trim().to_ascii_uppercase().as_str())
}

/// Whether `value` is acceptable as an attached schema name.
#[must_use]
pub fn is_valid_schema_name(value: &str) -> bool {
    SCHEMA_NAME.is_match(value)
}

/// Wrap `value` in double quotes, doubling any embedded double quote.
#[must_use]
pub fn double_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Wrap `value` in single quotes as an SQL string literal.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Return `value` bare when it is a plain identifier, double-quoted otherwise.
#[must_use]
pub fn quote_identifier(value: &str) -> String {
    if !is_reserved_word(value) && BARE_IDENTIFIER.is_match(value) {
        value.to_owned()
    } else {
        double_quote(value)
    }
}
