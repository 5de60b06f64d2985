use async_trait::async_trait;
use itertools::Itertools;
use tracing::{debug, instrument};
use crate::capabilities::{AppliedVersion, VersionRegistry};
use crate::quoting::{quote_value_string, IdentifierQuoter};
use crate::{MigrationVersion, PostgresClientWrapper, Result};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PostgresVersionRegistryOptions {
    /// The schema the registry table lives in.
    pub schema: String,
    pub table_name: String,
}

impl Default for PostgresVersionRegistryOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table_name: "elefant_migration_versions".to_string(),
        }
    }
}

/// Keeps the applied versions in a table in the migrated database, so the record of a step is
/// committed together with the step itself.
pub struct PostgresVersionRegistry<'a> {
    connection: &'a PostgresClientWrapper,
    qualified_table_name: String,
}

impl<'a> PostgresVersionRegistry<'a> {
    pub fn new(connection: &'a PostgresClientWrapper, options: PostgresVersionRegistryOptions) -> Self {
        let quoter = IdentifierQuoter::empty();
        PostgresVersionRegistry {
            connection,
            qualified_table_name: quoter.quote_qualified(&options.schema, &options.table_name),
        }
    }
}

#[async_trait]
impl VersionRegistry for PostgresVersionRegistry<'_> {
    #[instrument(skip_all)]
    async fn ensure_created(&self) -> Result {
        self.connection
            .execute_non_query(&format!(
                "create table if not exists {} (version text primary key, applied_at timestamptz not null default now());",
                self.qualified_table_name
            ))
            .await
    }

    #[instrument(skip_all)]
    async fn applied_versions(&self) -> Result<Vec<AppliedVersion>> {
        let rows = self
            .connection
            .get_results::<(String, i64)>(&format!(
                "select version, (extract(epoch from applied_at) * 1000)::int8 from {};",
                self.qualified_table_name
            ))
            .await?;

        let versions = rows
            .into_iter()
            .map(|(version, applied_at_millis)| {
                Ok(AppliedVersion {
                    version: version.parse()?,
                    applied_at_millis,
                })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by(|a, b| a.version.cmp(&b.version))
            .collect_vec();

        debug!(count = versions.len(), "Read applied versions");

        Ok(versions)
    }

    #[instrument(skip(self))]
    async fn record_applied(&self, version: &MigrationVersion) -> Result {
        self.connection
            .execute_non_query(&format!(
                "insert into {} (version) values ({});",
                self.qualified_table_name,
                quote_value_string(&version.to_string())
            ))
            .await
    }
}
