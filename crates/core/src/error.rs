//! Error types for Trellis.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for Trellis operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised at schema-normalization time or from the public
/// pipeline surface (`connect`, `push`, `hydrate`).
///
/// Pipeline invariant violations are not represented here; they panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid schema definition.
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },
    /// Invalid primary key (empty, duplicated, optional or of an unsupported type).
    #[error("Invalid primary key for table {table}: {message}")]
    InvalidPrimaryKey { table: String, message: String },
    /// A table was registered under a different name than it declares.
    #[error("Table name mismatch: \"{actual}\" !== \"{expected}\"")]
    TableNameMismatch { expected: String, actual: String },
    /// Table not found.
    #[error("Table not found: {name}")]
    TableNotFound { name: String },
    /// Column not found.
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },
    /// Relationship not found.
    #[error("Relationship {relationship} not found in table {table}")]
    RelationshipNotFound { table: String, relationship: String },
    /// An ordering does not contain every primary key column.
    #[error("Ordering must include all primary key columns, missing: {column}")]
    OrderingMissingPrimaryKey { column: String },
    /// Pushed an `add` for a row that is already present.
    #[error("Row already exists in table {table}: {row}")]
    RowAlreadyExists { table: String, row: String },
    /// Pushed a `remove` or `edit` for a row that is not present.
    #[error("Row not found in table {table}: {row}")]
    RowNotFound { table: String, row: String },
    /// `hydrate` was called more than once on a view.
    #[error("Can't hydrate twice")]
    AlreadyHydrated,
}

impl Error {
    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid primary key error.
    pub fn invalid_primary_key(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidPrimaryKey {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a table name mismatch error.
    pub fn table_name_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::TableNameMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a relationship not found error.
    pub fn relationship_not_found(
        table: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Error::RelationshipNotFound {
            table: table.into(),
            relationship: relationship.into(),
        }
    }

    /// Creates an ordering error naming the first missing primary key column.
    pub fn ordering_missing_primary_key(column: impl Into<String>) -> Self {
        Error::OrderingMissingPrimaryKey {
            column: column.into(),
        }
    }

    /// Creates a row already exists error.
    pub fn row_already_exists(table: impl Into<String>, row: impl Into<String>) -> Self {
        Error::RowAlreadyExists {
            table: table.into(),
            row: row.into(),
        }
    }

    /// Creates a row not found error.
    pub fn row_not_found(table: impl Into<String>, row: impl Into<String>) -> Self {
        Error::RowNotFound {
            table: table.into(),
            row: row.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::table_not_found("issue");
        assert!(err.to_string().contains("issue"));

        let err = Error::table_name_mismatch("issue", "issues");
        assert_eq!(err.to_string(), "Table name mismatch: \"issues\" !== \"issue\"");

        assert_eq!(Error::AlreadyHydrated.to_string(), "Can't hydrate twice");
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::invalid_primary_key("issue", "Primary key must not be empty");
        match err {
            Error::InvalidPrimaryKey { table, .. } => assert_eq!(table, "issue"),
            _ => panic!("Wrong error type"),
        }

        let err = Error::relationship_not_found("issue", "labels");
        assert!(err.to_string().contains("labels"));
    }
}
