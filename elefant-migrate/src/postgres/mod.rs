use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::Row;
use tracing::{debug, instrument};
use crate::capabilities::{Connection, MigrationContext, SchemaHelper, SchemaManager};
use crate::postgres_client_wrapper::{FromPgChar, FromRow, RowEnumExt};
use crate::quoting::{AllowedKeywordUsage, IdentifierQuoter};
use crate::schema_reader::PostgresSchemaManager;
use crate::{MigrationError, PostgresClientWrapper};

mod schema_helper;
mod version_registry;

pub use schema_helper::*;
pub use version_registry::*;

/// Runs migrations against one schema of a Postgres database.
pub struct PostgresMigrationContext<'a> {
    connection: &'a PostgresClientWrapper,
    schema_manager: PostgresSchemaManager<'a>,
    schema_helper: PostgresSchemaHelper<'a>,
}

impl<'a> PostgresMigrationContext<'a> {
    #[instrument(skip(connection))]
    pub async fn new(connection: &'a PostgresClientWrapper, schema: &str) -> crate::Result<Self> {
        debug!(server_version = connection.version(), "Connected");
        let identifier_quoter = Arc::new(load_identifier_quoter(connection).await?);

        Ok(PostgresMigrationContext {
            connection,
            schema_manager: PostgresSchemaManager::new(connection, schema),
            schema_helper: PostgresSchemaHelper::new(connection, schema, identifier_quoter),
        })
    }
}

impl MigrationContext for PostgresMigrationContext<'_> {
    fn connection(&self) -> &dyn Connection {
        self.connection
    }

    fn schema_helper(&self) -> &dyn SchemaHelper {
        &self.schema_helper
    }

    fn schema_manager(&self) -> &dyn SchemaManager {
        &self.schema_manager
    }
}

async fn load_identifier_quoter(connection: &PostgresClientWrapper) -> crate::Result<IdentifierQuoter> {
    let keywords = connection
        .get_results::<Keyword>("select word, catcode from pg_get_keywords() where catcode <> 'U'")
        .await?;

    let mut keyword_info = HashMap::new();

    for keyword in keywords {
        keyword_info.insert(
            keyword.word,
            AllowedKeywordUsage {
                column_name: keyword.category == KeywordType::AllowedInColumnName
                    || keyword.category == KeywordType::AllowedInTypeOrFunctionName,
                type_or_function_name: keyword.category == KeywordType::AllowedInTypeOrFunctionName,
            },
        );
    }

    Ok(IdentifierQuoter::new(keyword_info))
}

struct Keyword {
    word: String,
    category: KeywordType,
}

impl FromRow for Keyword {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Keyword {
            word: row.try_get(0)?,
            category: row.try_get_enum_value(1)?,
        })
    }
}

#[derive(Eq, PartialEq, Debug)]
enum KeywordType {
    Unreserved,
    AllowedInColumnName,
    AllowedInTypeOrFunctionName,
    Reserved,
}

impl FromPgChar for KeywordType {
    fn from_pg_char(c: char) -> crate::Result<Self> {
        match c {
            'U' => Ok(KeywordType::Unreserved),
            'C' => Ok(KeywordType::AllowedInColumnName),
            'T' => Ok(KeywordType::AllowedInTypeOrFunctionName),
            'R' => Ok(KeywordType::Reserved),
            _ => Err(MigrationError::InvalidKeywordType(c.to_string())),
        }
    }
}
