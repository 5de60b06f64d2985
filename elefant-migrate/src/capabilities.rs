use async_trait::async_trait;
use crate::{ColumnSpec, ForeignKey, MigrationVersion, Result, Table};

/// Executes raw statements against the database the migrations are applied to.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute_statement(&self, sql: &str) -> Result;

    async fn begin(&self) -> Result {
        self.execute_statement("begin;").await
    }

    async fn commit(&self) -> Result {
        self.execute_statement("commit;").await
    }

    async fn rollback(&self) -> Result {
        self.execute_statement("rollback;").await
    }
}

/// Reads the live structure of the database.
///
/// Every call reflects the schema at the time of the call, nothing is cached.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    /// Fails with [`crate::MigrationError::TableNotFound`] if the table does not exist.
    async fn introspect_table(&self, table: &str) -> Result<Table>;
}

/// Applies structural changes.
#[async_trait]
pub trait SchemaHelper: Send + Sync {
    async fn change_column(&self, table: &str, column: &str, spec: &ColumnSpec) -> Result;

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result;

    async fn drop_foreign_keys(&self, table: &str, names: &[String]) -> Result;
}

/// Everything a migration step is allowed to use.
pub trait MigrationContext: Send + Sync {
    fn connection(&self) -> &dyn Connection;

    fn schema_helper(&self) -> &dyn SchemaHelper;

    fn schema_manager(&self) -> &dyn SchemaManager;
}

/// The time a version was recorded as applied, in milliseconds since the unix epoch.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AppliedVersion {
    pub version: MigrationVersion,
    pub applied_at_millis: i64,
}

/// Durable record of which migration versions have been applied.
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    async fn ensure_created(&self) -> Result;

    async fn applied_versions(&self) -> Result<Vec<AppliedVersion>>;

    async fn record_applied(&self, version: &MigrationVersion) -> Result;
}
