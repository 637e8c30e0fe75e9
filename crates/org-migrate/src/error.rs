//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (bad flag combination, invalid YAML, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Organization account could not be resolved to an id.
    #[error("Unknown organization: {0}")]
    OrgNotFound(String),

    /// Archive container error (corrupt zip, unwritable file, etc.)
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A required archive entry is absent.
    #[error("Archive entry missing: {0}")]
    EntryMissing(String),

    /// An archive entry failed structural validation.
    #[error("Malformed archive entry {entry}: {message}")]
    MalformedEntry { entry: String, message: String },

    /// Table or column name contains characters outside [A-Za-z0-9_].
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The upsert path requires a `label` column.
    #[error("Table {0} lacks a label column")]
    MissingNaturalKey(String),

    /// PostgreSQL query or connection error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL/MariaDB query or connection error.
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    /// A value flagged for binary decoding was not valid base64.
    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Dependency graph exceeded the recursion ceiling.
    #[error("Dependency graph exceeded {limit} levels resolving task: {task}")]
    DependencyDepth { task: String, limit: usize },

    /// An export/import task failed.
    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MigrateError {
    /// Create a MalformedEntry error.
    pub fn malformed(entry: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::MalformedEntry {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Create a Task error.
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::OrgNotFound(_) => 3,
            MigrateError::DependencyDepth { .. } => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::OrgNotFound("acme".into()).exit_code(), 3);
        assert_eq!(
            MigrateError::DependencyDepth {
                task: "pool".into(),
                limit: 100
            }
            .exit_code(),
            4
        );
        assert_eq!(MigrateError::EntryMissing("cp_owner.json".into()).exit_code(), 1);
    }

    #[test]
    fn test_task_error_message() {
        let err = MigrateError::task("consumer", "insert failed");
        assert_eq!(err.to_string(), "Task consumer failed: insert failed");
    }
}
