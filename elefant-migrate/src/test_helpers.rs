//! An in-memory stand-in for a database, for testing migration steps without a running
//! Postgres.
//!
//! All the inspection methods on [`InMemoryDatabase`] panic instead of returning errors, to make
//! tests easier to write.

use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use tracing::debug;
use crate::planner::{check_foreign_key_compatibility, needs_correction};
use crate::{
    AppliedVersion, ColumnSpec, Connection, ForeignKey, MigrationContext, MigrationError,
    MigrationVersion, PostgresClientWrapper, Result, SchemaHelper, SchemaManager, Table,
    TableColumn, VersionRegistry,
};

/// Installs a tracing subscriber that writes to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A not null varchar column in the `UTF8` charset with the default collation.
pub fn varchar_column(name: &str, length: i32) -> TableColumn {
    TableColumn {
        name: name.to_string(),
        ordinal_position: 1,
        data_type: "varchar".to_string(),
        data_type_length: Some(length),
        is_nullable: false,
        charset: Some("UTF8".to_string()),
        collation: None,
    }
}

/// Environment variable holding the libpq key/value connection string of a Postgres server used
/// by the tests that need a live database, without a `dbname`. Those tests do nothing when it is
/// not set, e.g. `host=localhost port=5415 user=postgres password=passw0rd`.
pub const TEST_POSTGRES_ENV: &str = "ELEFANT_MIGRATE_TEST_POSTGRES";

/// A freshly created database on the server named by [`TEST_POSTGRES_ENV`].
///
/// The database is dropped by [`PostgresTestDatabase::stop`]. A test that panics leaves it
/// around to be inspected.
pub struct PostgresTestDatabase {
    /// The name of the test database
    pub name: String,
    server: String,
    connection: PostgresClientWrapper,
}

/// Creates a new database with a random name, or returns `None` if no test server is configured.
pub async fn get_test_database() -> Option<PostgresTestDatabase> {
    let Ok(server) = std::env::var(TEST_POSTGRES_ENV) else {
        eprintln!("{} is not set, skipping test that needs Postgres", TEST_POSTGRES_ENV);
        return None;
    };

    let name = format!("test_db_{}", uuid::Uuid::new_v4().simple());
    {
        let conn = connect(&server, "postgres").await;
        conn.execute_non_query(&format!("create database {};", name))
            .await
            .expect("Failed to create test database");
    }

    let connection = connect(&server, &name).await;

    Some(PostgresTestDatabase {
        name,
        server,
        connection,
    })
}

async fn connect(server: &str, database_name: &str) -> PostgresClientWrapper {
    PostgresClientWrapper::new(&format!("{} dbname={}", server, database_name))
        .await
        .expect("Connection to test database failed. Is postgres running?")
}

impl PostgresTestDatabase {
    /// Gets the connection the database was set up with.
    pub fn get_conn(&self) -> &PostgresClientWrapper {
        &self.connection
    }

    /// A connection string for opening more connections to the test database.
    pub fn connection_string(&self) -> String {
        format!("{} dbname={}", self.server, self.name)
    }

    /// Executes statements that do not return any results.
    pub async fn execute_not_query(&self, sql: &str) {
        self.connection
            .execute_non_query(sql)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute non query: {:?}\n{}", e, sql));
    }

    /// Closes the connection and drops the database.
    pub async fn stop(self) {
        let PostgresTestDatabase {
            name,
            server,
            connection,
        } = self;
        drop(connection);

        let conn = connect(&server, "postgres").await;
        conn.execute_non_query(&format!(
            "select pg_terminate_backend(pid) from pg_stat_activity where datname = '{}' and pid <> pg_backend_pid();",
            name
        ))
        .await
        .expect("Failed to disconnect from test database");
        conn.execute_non_query(&format!("drop database {};", name))
            .await
            .expect("Failed to drop test database");
    }
}

/// A schema change or raw statement that reached the database.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SchemaOperation {
    ChangeColumn {
        table: String,
        column: String,
        spec: ColumnSpec,
    },
    AddForeignKey {
        table: String,
        name: String,
    },
    DropForeignKey {
        table: String,
        name: String,
    },
    Statement(String),
}

impl SchemaOperation {
    pub fn is_ddl(&self) -> bool {
        !matches!(self, SchemaOperation::Statement(_))
    }
}

/// Where [`InMemoryDatabase::fail_at`] makes the database reject the next matching operation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FailurePoint {
    ChangeColumn { table: String },
    AddForeignKey { table: String },
    RecordApplied,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    tables: Vec<Table>,
    applied: Vec<AppliedVersion>,
}

#[derive(Debug, Default)]
struct State {
    tables: Vec<Table>,
    applied: Vec<AppliedVersion>,
    registry_created: bool,
    operations: Vec<SchemaOperation>,
    transaction: Option<Snapshot>,
    non_transactional_ddl: bool,
    failures: Vec<FailurePoint>,
    clock: i64,
}

impl State {
    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrationError::TableNotFound(name.to_string()))
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrationError::TableNotFound(name.to_string()))
    }

    fn check_failure(&self, point: FailurePoint, statement: &str) -> Result {
        if self.failures.contains(&point) {
            debug!(?point, "Injected failure");
            return Err(rejected(statement, "injected failure"));
        }
        Ok(())
    }

    /// The name of a foreign key that has `table.column` on either side and whose two sides no
    /// longer agree.
    fn broken_foreign_key(&self, table: &str, column: &str) -> Option<String> {
        for owning in &self.tables {
            for fk in &owning.foreign_keys {
                for (local, referenced) in fk.column_pairs() {
                    let touches = (owning.name == table && local == column)
                        || (fk.referenced_table == table && referenced == column);
                    if !touches {
                        continue;
                    }

                    let local_column = owning.column(local);
                    let referenced_column = self
                        .table(&fk.referenced_table)
                        .ok()
                        .and_then(|t| t.column(referenced));

                    if let (Some(a), Some(b)) = (local_column, referenced_column) {
                        if needs_correction(a, b) {
                            return Some(fk.name.clone());
                        }
                    }
                }
            }
        }

        None
    }
}

fn rejected(statement: &str, reason: &str) -> MigrationError {
    MigrationError::DdlExecution {
        statement: statement.to_string(),
        source: reason.to_string().into(),
    }
}

/// Tables, foreign keys and applied versions kept in memory.
///
/// Behaves like a strict engine: a column cannot be changed while a foreign key connects it to a
/// column it would no longer match, and a foreign key cannot be created between mismatched
/// columns. DDL is transactional unless [`InMemoryDatabase::without_transactional_ddl`] is used.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    state: Mutex<State>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Rolling back only forgets recorded versions, schema changes stay, like on engines that
    /// commit implicitly around DDL.
    pub fn without_transactional_ddl(self) -> Self {
        self.state().non_transactional_ddl = true;
        self
    }

    pub fn add_table(&self, table: Table) {
        let mut state = self.state();
        state.tables.retain(|t| t.name != table.name);
        state.tables.push(table);
    }

    pub fn fail_at(&self, point: FailurePoint) {
        self.state().failures.push(point);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Marks a version as applied without running anything, as an older installer would have.
    pub fn mark_applied(&self, version: &str) {
        let mut state = self.state();
        state.registry_created = true;
        state.clock += 1;
        let applied_at_millis = state.clock;
        state.applied.push(AppliedVersion {
            version: version.parse().unwrap(),
            applied_at_millis,
        });
    }

    pub fn table(&self, name: &str) -> Table {
        self.state().table(name).unwrap().clone()
    }

    pub fn column(&self, table: &str, column: &str) -> TableColumn {
        self.table(table).require_column(column).unwrap().clone()
    }

    pub fn applied(&self) -> Vec<MigrationVersion> {
        self.state().applied.iter().map(|a| a.version.clone()).collect()
    }

    pub fn operations(&self) -> Vec<SchemaOperation> {
        self.state().operations.clone()
    }

    pub fn ddl_operations(&self) -> Vec<SchemaOperation> {
        self.state()
            .operations
            .iter()
            .filter(|op| op.is_ddl())
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    pub fn in_transaction(&self) -> bool {
        self.state().transaction.is_some()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connection for InMemoryDatabase {
    async fn execute_statement(&self, sql: &str) -> Result {
        self.state()
            .operations
            .push(SchemaOperation::Statement(sql.to_string()));
        Ok(())
    }

    async fn begin(&self) -> Result {
        let mut state = self.state();
        if state.transaction.is_some() {
            return Err(rejected("begin;", "a transaction is already in progress"));
        }

        state.transaction = Some(Snapshot {
            tables: state.tables.clone(),
            applied: state.applied.clone(),
        });
        state.operations.push(SchemaOperation::Statement("begin;".to_string()));
        Ok(())
    }

    async fn commit(&self) -> Result {
        let mut state = self.state();
        if state.transaction.take().is_none() {
            return Err(rejected("commit;", "no transaction in progress"));
        }

        state.operations.push(SchemaOperation::Statement("commit;".to_string()));
        Ok(())
    }

    async fn rollback(&self) -> Result {
        let mut state = self.state();
        let Some(snapshot) = state.transaction.take() else {
            return Err(rejected("rollback;", "no transaction in progress"));
        };

        if !state.non_transactional_ddl {
            state.tables = snapshot.tables;
        }
        state.applied = snapshot.applied;
        state.operations.push(SchemaOperation::Statement("rollback;".to_string()));
        Ok(())
    }
}

#[async_trait]
impl SchemaManager for InMemoryDatabase {
    async fn introspect_table(&self, table: &str) -> Result<Table> {
        self.state().table(table).cloned()
    }
}

#[async_trait]
impl SchemaHelper for InMemoryDatabase {
    async fn change_column(&self, table: &str, column: &str, spec: &ColumnSpec) -> Result {
        let mut state = self.state();
        let statement = format!("alter table {} alter column {} type {}", table, column, spec.type_expression());
        state.check_failure(FailurePoint::ChangeColumn { table: table.to_string() }, &statement)?;

        let previous = {
            let existing = state.table_mut(table)?;
            let current = existing
                .columns
                .iter_mut()
                .find(|c| c.name == column)
                .ok_or_else(|| MigrationError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.to_string(),
                })?;

            let previous = current.clone();
            current.data_type = spec.data_type.clone();
            current.data_type_length = spec.length;
            current.is_nullable = spec.nullable;
            current.collation = spec.collation.clone();
            if spec.charset.is_some() {
                current.charset = spec.charset.clone();
            }
            previous
        };

        if let Some(name) = state.broken_foreign_key(table, column) {
            let existing = state.table_mut(table)?;
            if let Some(current) = existing.columns.iter_mut().find(|c| c.name == column) {
                *current = previous;
            }
            return Err(rejected(
                &statement,
                &format!("column is used by foreign key constraint '{}'", name),
            ));
        }

        state.operations.push(SchemaOperation::ChangeColumn {
            table: table.to_string(),
            column: column.to_string(),
            spec: spec.clone(),
        });
        Ok(())
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result {
        let mut state = self.state();
        let statement = format!("alter table {} add constraint {}", table, foreign_key.name);
        state.check_failure(FailurePoint::AddForeignKey { table: table.to_string() }, &statement)?;

        let owning = state.table(table)?;
        if owning.has_foreign_key(&foreign_key.name) {
            return Err(rejected(&statement, "constraint already exists"));
        }
        let referenced = state.table(&foreign_key.referenced_table)?;
        check_foreign_key_compatibility(owning, foreign_key, referenced)?;

        state.table_mut(table)?.foreign_keys.push(foreign_key.clone());
        state.operations.push(SchemaOperation::AddForeignKey {
            table: table.to_string(),
            name: foreign_key.name.clone(),
        });
        Ok(())
    }

    async fn drop_foreign_keys(&self, table: &str, names: &[String]) -> Result {
        let mut state = self.state();
        let existing = state.table_mut(table)?;

        if let Some(missing) = names.iter().find(|n| !existing.has_foreign_key(n)) {
            return Err(MigrationError::ForeignKeyNotFound {
                table: table.to_string(),
                name: missing.clone(),
            });
        }

        existing.foreign_keys.retain(|fk| !names.contains(&fk.name));
        for name in names {
            state.operations.push(SchemaOperation::DropForeignKey {
                table: table.to_string(),
                name: name.clone(),
            });
        }
        Ok(())
    }
}

impl MigrationContext for InMemoryDatabase {
    fn connection(&self) -> &dyn Connection {
        self
    }

    fn schema_helper(&self) -> &dyn SchemaHelper {
        self
    }

    fn schema_manager(&self) -> &dyn SchemaManager {
        self
    }
}

#[async_trait]
impl VersionRegistry for InMemoryDatabase {
    async fn ensure_created(&self) -> Result {
        self.state().registry_created = true;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<AppliedVersion>> {
        let state = self.state();
        if !state.registry_created {
            return Err(MigrationError::TableNotFound("elefant_migration_versions".to_string()));
        }
        Ok(state.applied.clone())
    }

    async fn record_applied(&self, version: &MigrationVersion) -> Result {
        let mut state = self.state();
        let statement = format!("insert into elefant_migration_versions (version) values ('{}')", version);
        state.check_failure(FailurePoint::RecordApplied, &statement)?;

        if state.applied.iter().any(|a| &a.version == version) {
            return Err(rejected(&statement, "duplicate key value violates unique constraint"));
        }

        state.clock += 1;
        let applied_at_millis = state.clock;
        state.applied.push(AppliedVersion {
            version: version.clone(),
            applied_at_millis,
        });
        Ok(())
    }
}
