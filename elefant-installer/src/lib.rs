//! The schema upgrades shipped with the installer, and the entry point that applies them.

use elefant_migrate::{
    MigrationRunner, MigrationRunnerOptions, MigrationStep, PostgresClientWrapper,
    PostgresMigrationContext, PostgresVersionRegistry, PostgresVersionRegistryOptions, Result,
    RunReport,
};
use tracing::{error, info, instrument};

mod migrations;

pub use migrations::*;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstallerOptions {
    /// The schema holding the application tables.
    pub schema: String,
    /// Collation of the currency code columns. `None` uses the database default.
    pub currency_collation: Option<String>,
    pub registry: PostgresVersionRegistryOptions,
    pub runner: MigrationRunnerOptions,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            currency_collation: None,
            registry: PostgresVersionRegistryOptions::default(),
            runner: MigrationRunnerOptions::default(),
        }
    }
}

/// Every upgrade step, in no particular order. The runner orders them by version.
pub fn migrations(options: &InstallerOptions) -> Vec<Box<dyn MigrationStep>> {
    vec![Box::new(AlignCurrencyCodes::new(options.currency_collation.clone()))]
}

/// Connects to the database and applies every step that has not been applied yet.
#[instrument(skip_all, fields(schema = %options.schema))]
pub async fn upgrade(connection_string: &str, options: &InstallerOptions) -> Result<RunReport> {
    let connection = PostgresClientWrapper::new(connection_string).await?;
    let context = PostgresMigrationContext::new(&connection, &options.schema).await?;
    let registry = PostgresVersionRegistry::new(&connection, options.registry.clone());

    let runner = MigrationRunner::new(&context, &registry, options.runner.clone());
    let report = match runner.apply_pending(&migrations(options)).await {
        Ok(report) => report,
        Err(e) => {
            error!(cause = %e.root_cause(), "Upgrade failed");
            return Err(e);
        }
    };

    info!(applied = report.applied.len(), "Upgrade finished");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefant_migrate::test_helpers::{get_test_database, init_tracing};
    use elefant_migrate::MigrationVersion;
    use indoc::indoc;

    #[test]
    fn default_options() {
        let options = InstallerOptions::default();

        assert_eq!(options.schema, "public");
        assert_eq!(options.currency_collation, None);
        assert_eq!(options.registry.table_name, "elefant_migration_versions");
        assert!(options.runner.transactional_steps);
    }

    #[test]
    fn collation_is_passed_to_the_steps() {
        let options = InstallerOptions {
            currency_collation: Some("C".to_string()),
            ..Default::default()
        };

        let step = AlignCurrencyCodes::new(options.currency_collation.clone());
        assert_eq!(step.currency_spec().collation.as_deref(), Some("C"));
        assert_eq!(migrations(&options).len(), 1);
    }

    #[tokio::test]
    async fn upgrades_a_live_database_once() {
        init_tracing();
        let Some(helper) = get_test_database().await else {
            return;
        };
        helper
            .execute_not_query(indoc! {r#"
                create table hs_hr_currency_type(currency_id varchar(6) not null primary key, currency_name varchar(70));
                create table ohrm_pay_grade_currency(
                    pay_grade_id int,
                    currency_id varchar(6) not null,
                    constraint ohrm_pay_grade_currency_ibfk_1 foreign key (currency_id) references hs_hr_currency_type(currency_id) on delete cascade
                );
                create table hs_hr_emp_basicsalary(
                    id int,
                    currency_id varchar(6) not null,
                    constraint hs_hr_emp_basicsalary_ibfk_3 foreign key (currency_id) references hs_hr_currency_type(currency_id) on delete cascade
                );
                create table ohrm_claim_request(id int, currency_id varchar(3) not null);
            "#})
            .await;
        let options = InstallerOptions::default();

        let report = upgrade(&helper.connection_string(), &options).await.unwrap();
        assert_eq!(report.applied, vec!["5.7.1".parse::<MigrationVersion>().unwrap()]);

        let report = upgrade(&helper.connection_string(), &options).await.unwrap();
        assert!(report.applied.is_empty());

        let constraints = helper
            .get_conn()
            .get_results::<(String, i64)>(indoc! {r#"
                select conname::text, count(*)
                from pg_constraint
                where contype = 'f'
                group by conname
                order by conname;
            "#})
            .await
            .unwrap();
        assert_eq!(
            constraints,
            vec![
                ("fk_currency_id".to_string(), 1),
                ("hs_hr_emp_basicsalary_ibfk_3".to_string(), 1),
                ("ohrm_pay_grade_currency_ibfk_1".to_string(), 1),
            ]
        );

        helper.stop().await;
    }
}
