use std::fmt;

/// SQLSTATE / engine codes reported for unique-key violations
const UNIQUE_VIOLATION_CODES: &[&str] = &[
    "23505", // PostgreSQL
    "1062",  // MySQL
    "1555",  // SQLite, primary key
    "2067",  // SQLite, unique index
];

/// Message fragments for drivers that do not classify the error
const UNIQUE_VIOLATION_PHRASES: &[&str] = &[
    "duplicate key",
    "duplicate entry",
    "unique constraint",
    "violation of primary key constraint",
    "duplicate value",
];

/// SQL flavour behind an `AnyPool`, derived from the connection URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

impl SqlDialect {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(SqlDialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(SqlDialect::Sqlite)
        } else {
            None
        }
    }

    /// Column type for raw binary payloads
    pub fn blob_type(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "BYTEA",
            SqlDialect::Sqlite => "BLOB",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// `$start, $start+1, ...` for a bind list of `count` values
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether a database error is a unique-key violation.
///
/// Structured classification first, then engine codes, then the message text
/// for drivers that only report a string.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };

    if db.is_unique_violation() {
        return true;
    }

    if let Some(code) = db.code() {
        if UNIQUE_VIOLATION_CODES.contains(&&*code) {
            return true;
        }
    }

    is_unique_violation_message(db.message())
}

pub(crate) fn is_unique_violation_message(message: &str) -> bool {
    let message = message.to_lowercase();
    UNIQUE_VIOLATION_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            SqlDialect::from_url("postgres://localhost/db"),
            Some(SqlDialect::Postgres)
        );
        assert_eq!(
            SqlDialect::from_url("postgresql://localhost/db"),
            Some(SqlDialect::Postgres)
        );
        assert_eq!(
            SqlDialect::from_url("sqlite::memory:"),
            Some(SqlDialect::Sqlite)
        );
        assert_eq!(SqlDialect::from_url("mysql://localhost/db"), None);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(4, 1), "$4");
        assert_eq!(placeholders(1, 0), "");
    }

    #[test]
    fn test_unique_violation_messages_of_common_engines() {
        let messages = [
            "duplicate key value violates unique constraint \"binaries_pkey\"",
            "Duplicate entry 'abc' for key 'PRIMARY'",
            "UNIQUE constraint failed: binaries.primary_hash",
            "ORA-00001: unique constraint (APP.PK) violated",
            "Violation of PRIMARY KEY constraint 'PK_binaries'",
            "The statement was aborted because it would have caused a duplicate key value",
        ];
        for message in messages {
            assert!(is_unique_violation_message(message), "{}", message);
        }
        assert!(!is_unique_violation_message("connection reset by peer"));
    }

    #[test]
    fn test_non_database_errors_are_not_duplicates() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
