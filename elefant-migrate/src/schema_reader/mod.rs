use async_trait::async_trait;
use itertools::Itertools;
use tracing::{debug, instrument};
use crate::capabilities::SchemaManager;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::schema_reader::foreign_key::ForeignKeyResult;
use crate::schema_reader::foreign_key_column::ForeignKeyColumnResult;
use crate::{ForeignKey, MigrationError, Result, Table};

mod foreign_key;
mod foreign_key_column;
mod table;
mod table_column;

/// Introspects tables in a single schema of a Postgres database.
pub struct PostgresSchemaManager<'a> {
    connection: &'a PostgresClientWrapper,
    schema: String,
}

impl<'a> PostgresSchemaManager<'a> {
    pub fn new(connection: &'a PostgresClientWrapper, schema: &str) -> Self {
        PostgresSchemaManager {
            connection,
            schema: schema.to_string(),
        }
    }

    fn build_foreign_key(
        &self,
        foreign_key: ForeignKeyResult,
        columns: &[ForeignKeyColumnResult],
    ) -> ForeignKey {
        let (local, referenced): (Vec<_>, Vec<_>) = columns
            .iter()
            .filter(|c| c.constraint_name == foreign_key.constraint_name)
            .sorted_by_key(|c| c.position)
            .map(|c| {
                (
                    c.source_table_column_name.clone(),
                    c.target_table_column_name.clone(),
                )
            })
            .unzip();

        let referenced_schema = if foreign_key.target_table_schema_name == self.schema {
            None
        } else {
            Some(foreign_key.target_table_schema_name)
        };

        ForeignKey {
            name: foreign_key.constraint_name,
            columns: local,
            referenced_schema,
            referenced_table: foreign_key.target_table_name,
            referenced_columns: referenced,
            update_action: foreign_key.update_action,
            delete_action: foreign_key.delete_action,
        }
    }
}

#[async_trait]
impl SchemaManager for PostgresSchemaManager<'_> {
    #[instrument(skip(self), fields(schema = %self.schema))]
    async fn introspect_table(&self, table: &str) -> Result<Table> {
        if self.get_table(table).await?.is_empty() {
            return Err(MigrationError::TableNotFound(table.to_string()));
        }

        let columns = self.get_columns(table).await?;
        let foreign_keys = self.get_foreign_keys(table).await?;
        let foreign_key_columns = self.get_foreign_key_columns(table).await?;

        debug!(
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Introspected table"
        );

        Ok(Table {
            name: table.to_string(),
            columns: columns.iter().map(|c| c.to_table_column()).collect(),
            foreign_keys: foreign_keys
                .into_iter()
                .map(|fk| self.build_foreign_key(fk, &foreign_key_columns))
                .collect(),
        })
    }
}

/// Defines a query against the catalog that is filtered to a single table. The query gets the
/// schema name as `$1` and the table name as `$2`.
macro_rules! define_table_query {
    ($fn_name:ident, $result:ident, $query:literal) => {
        impl $crate::schema_reader::PostgresSchemaManager<'_> {
            #[tracing::instrument(skip(self))]
            pub(in crate::schema_reader) async fn $fn_name(
                &self,
                table: &str,
            ) -> $crate::Result<Vec<$result>> {
                self.connection
                    .get_results_with_params($query, &[&self.schema, &table])
                    .await
            }
        }
    };
}

pub(crate) use define_table_query;
