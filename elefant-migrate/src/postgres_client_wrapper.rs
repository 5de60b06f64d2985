use std::fmt::Display;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::row::RowIndex;
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{Client, NoTls, Row};
use tracing::debug;
use crate::capabilities::Connection;
use crate::{MigrationError, Result};

/// The single session a migration run is executed on.
pub struct PostgresClientWrapper {
    client: Client,
    join_handle: JoinHandle<Result<()>>,
    version: i32,
}

impl PostgresClientWrapper {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

        // The connection object performs the actual communication with the database,
        // so spawn it off to run on its own.
        let join_handle = tokio::spawn(async move {
            match connection.await {
                Err(e) => Err(MigrationError::PostgresError(e)),
                Ok(_) => Ok(()),
            }
        });

        let version = match client.simple_query("SHOW server_version_num;").await?.first() {
            Some(tokio_postgres::SimpleQueryMessage::Row(row)) => {
                let version: i32 = row
                    .get(0)
                    .and_then(|v| v.parse().ok())
                    .ok_or(MigrationError::InvalidPostgresVersionResponse)?;
                if version < 120000 {
                    return Err(MigrationError::UnsupportedPostgresVersion(version));
                }
                version / 1000
            }
            _ => return Err(MigrationError::InvalidPostgresVersionResponse),
        };

        Ok(PostgresClientWrapper {
            client,
            join_handle,
            version,
        })
    }

    pub async fn execute_non_query(&self, sql: &str) -> Result {
        debug!(sql, "Executing statement");
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| MigrationError::PostgresErrorWithQuery {
                source: e,
                query: sql.to_string(),
            })?;

        Ok(())
    }

    pub async fn get_results<T: FromRow>(&self, sql: &str) -> Result<Vec<T>> {
        self.get_results_with_params(sql, &[]).await
    }

    pub async fn get_results_with_params<T: FromRow>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<T>> {
        let query_results = self
            .client
            .query(sql, params)
            .await
            .map_err(|e| MigrationError::PostgresErrorWithQuery {
                source: e,
                query: sql.to_string(),
            })?;

        query_results.into_iter().map(T::from_row).collect()
    }

    /// The major server version times ten, e.g. `150` for Postgres 15.
    pub fn version(&self) -> i32 {
        self.version
    }
}

impl Drop for PostgresClientWrapper {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

#[async_trait]
impl Connection for PostgresClientWrapper {
    async fn execute_statement(&self, sql: &str) -> Result {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| MigrationError::DdlExecution {
                statement: sql.to_string(),
                source: Box::new(e),
            })
    }
}

pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl<T1: FromSqlOwned> FromRow for (T1,) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?,))
    }
}

impl<T1: FromSqlOwned, T2: FromSqlOwned> FromRow for (T1, T2) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?, row.try_get(1)?))
    }
}

pub(crate) trait FromPgChar: Sized {
    fn from_pg_char(c: char) -> std::result::Result<Self, MigrationError>;
}

pub(crate) trait RowEnumExt {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T>;
}

impl RowEnumExt for Row {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T> {
        let value: i8 = self.try_get(idx)?;
        let c = value as u8 as char;
        T::from_pg_char(c)
    }
}
