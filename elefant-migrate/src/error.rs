use thiserror::Error;
use crate::{MigrationVersion, RunReport};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Error from postgres: `{0}`")]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Error from postgres: `{query}` when executing query: `{source}`")]
    PostgresErrorWithQuery {
        query: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Unsupported postgres version: {0}. Only postgres 12 and newer is supported")]
    UnsupportedPostgresVersion(i32),

    #[error("The server did not return a usable version number")]
    InvalidPostgresVersionResponse,

    #[error("Unknown foreign key reference action '{0}'")]
    UnknownReferenceAction(String),

    #[error("Unknown keyword type '{0}'")]
    InvalidKeywordType(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Column '{column}' does not exist on table '{table}'")]
    ColumnNotFound {
        table: String,
        column: String,
    },

    #[error("Foreign key '{name}' does not exist on table '{table}'")]
    ForeignKeyNotFound {
        table: String,
        name: String,
    },

    #[error("Foreign key '{constraint}' on table '{table}' cannot be created: column '{column}' does not match the type, length or collation of the referenced column '{referenced_table}.{referenced_column}'")]
    ConstraintConflict {
        constraint: String,
        table: String,
        column: String,
        referenced_table: String,
        referenced_column: String,
    },

    #[error("The database rejected `{statement}`: {source}")]
    DdlExecution {
        statement: String,
        #[source]
        source: BoxedError,
    },

    #[error("Invalid migration version '{0}'")]
    InvalidVersion(String),

    #[error("Migration version {0} is defined more than once")]
    DuplicateVersion(MigrationVersion),

    #[error("migration v{version} failed: {source}")]
    MigrationFailed {
        version: MigrationVersion,
        #[source]
        source: Box<MigrationError>,
        /// What the run did up to and including the failing step, which is the last entry of
        /// `steps`.
        report: Box<RunReport>,
    },
}

impl MigrationError {
    /// Whether the error was raised because the schema did not look like it was expected to,
    /// as opposed to the database refusing a statement.
    pub fn is_introspection_error(&self) -> bool {
        matches!(
            self,
            MigrationError::TableNotFound(_)
                | MigrationError::ColumnNotFound { .. }
                | MigrationError::ForeignKeyNotFound { .. }
        )
    }

    /// Gets the error that caused a migration to fail, or the error itself if it is not a
    /// wrapped migration failure.
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::MigrationFailed { source, .. } => source.root_cause(),
            e => e,
        }
    }
}

pub type Result<T = ()> = std::result::Result<T, MigrationError>;
