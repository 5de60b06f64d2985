#[cfg(any(test, feature = "test_utilities"))]
pub mod test_helpers;

mod capabilities;
mod constraint_resolver;
mod ddl_query_builder;
mod error;
mod helpers;
mod models;
mod planner;
mod postgres;
mod postgres_client_wrapper;
mod quoting;
mod repair;
mod runner;
mod schema_reader;
mod step;

pub use capabilities::*;
pub use constraint_resolver::*;
pub use error::*;
pub use models::*;
pub use planner::*;
pub use postgres::*;
pub use postgres_client_wrapper::{FromRow, PostgresClientWrapper};
pub use quoting::{AllowedKeywordUsage, AttemptedKeywordUsage, IdentifierQuoter};
pub use repair::*;
pub use runner::*;
pub use schema_reader::PostgresSchemaManager;
pub use step::*;
