use std::sync::Arc;
use async_trait::async_trait;
use tracing::{info, instrument};
use crate::capabilities::{Connection, SchemaHelper};
use crate::ddl_query_builder::DdlQueryBuilder;
use crate::quoting::IdentifierQuoter;
use crate::{ColumnSpec, ForeignKey, PostgresClientWrapper, Result};

/// Generates and executes DDL against a single schema.
pub struct PostgresSchemaHelper<'a> {
    connection: &'a PostgresClientWrapper,
    schema: String,
    identifier_quoter: Arc<IdentifierQuoter>,
}

impl<'a> PostgresSchemaHelper<'a> {
    pub fn new(
        connection: &'a PostgresClientWrapper,
        schema: &str,
        identifier_quoter: Arc<IdentifierQuoter>,
    ) -> Self {
        PostgresSchemaHelper {
            connection,
            schema: schema.to_string(),
            identifier_quoter,
        }
    }
}

#[async_trait]
impl SchemaHelper for PostgresSchemaHelper<'_> {
    #[instrument(skip(self, spec))]
    async fn change_column(&self, table: &str, column: &str, spec: &ColumnSpec) -> Result {
        let sql = change_column_statement(&self.identifier_quoter, &self.schema, table, column, spec);
        info!(data_type = %spec.type_expression(), "Changing column");
        self.connection.execute_statement(&sql).await
    }

    #[instrument(skip(self, foreign_key), fields(name = %foreign_key.name))]
    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result {
        let sql = add_foreign_key_statement(&self.identifier_quoter, &self.schema, table, foreign_key);
        info!("Adding foreign key");
        self.connection.execute_statement(&sql).await
    }

    #[instrument(skip(self))]
    async fn drop_foreign_keys(&self, table: &str, names: &[String]) -> Result {
        if names.is_empty() {
            return Ok(());
        }

        let sql = drop_foreign_keys_statement(&self.identifier_quoter, &self.schema, table, names);
        info!("Dropping foreign keys");
        self.connection.execute_statement(&sql).await
    }
}

pub(crate) fn change_column_statement(
    quoter: &IdentifierQuoter,
    schema: &str,
    table: &str,
    column: &str,
    spec: &ColumnSpec,
) -> String {
    let mut builder = DdlQueryBuilder::new(quoter);
    builder
        .alter_table(schema, table)
        .alter_column_type(column, spec)
        .set_nullable(column, spec.nullable);
    builder.build()
}

pub(crate) fn add_foreign_key_statement(
    quoter: &IdentifierQuoter,
    schema: &str,
    table: &str,
    foreign_key: &ForeignKey,
) -> String {
    let mut builder = DdlQueryBuilder::new(quoter);
    builder
        .alter_table(schema, table)
        .add_foreign_key(foreign_key, schema);
    builder.build()
}

pub(crate) fn drop_foreign_keys_statement(
    quoter: &IdentifierQuoter,
    schema: &str,
    table: &str,
    names: &[String],
) -> String {
    let mut builder = DdlQueryBuilder::new(quoter);
    let mut alter = builder.alter_table(schema, table);
    for name in names {
        alter.drop_constraint(name);
    }
    builder.build()
}
