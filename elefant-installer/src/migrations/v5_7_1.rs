use async_trait::async_trait;
use elefant_migrate::{
    ColumnConsistencyRepair, ColumnSpec, EnsureForeignKey, ForeignKey, MigrationContext,
    MigrationStep, MigrationVersion, ReferenceAction, Result,
};
use tracing::{info, instrument};

const CURRENCY_TYPE: &str = "hs_hr_currency_type";
const PAY_GRADE_CURRENCY: &str = "ohrm_pay_grade_currency";
const BASIC_SALARY: &str = "hs_hr_emp_basicsalary";
const CLAIM_REQUEST: &str = "ohrm_claim_request";
const CURRENCY_ID: &str = "currency_id";

/// Shrinks the currency code columns back to three characters and makes sure claim requests
/// reference the currency they are in.
///
/// Older installs widened some of the currency code columns, which left their foreign keys to
/// `hs_hr_currency_type` unable to be recreated.
#[derive(Debug, Clone)]
pub struct AlignCurrencyCodes {
    currency_collation: Option<String>,
}

impl AlignCurrencyCodes {
    pub fn new(currency_collation: Option<String>) -> Self {
        Self { currency_collation }
    }

    pub fn currency_spec(&self) -> ColumnSpec {
        match &self.currency_collation {
            Some(collation) => ColumnSpec::varchar(3).with_collation(collation.as_str()),
            None => ColumnSpec::varchar(3),
        }
    }

    fn repair(&self) -> ColumnConsistencyRepair {
        ColumnConsistencyRepair::new(CURRENCY_TYPE, CURRENCY_ID, self.currency_spec())
            .checked_table(PAY_GRADE_CURRENCY)
            .checked_table(BASIC_SALARY)
            .aligned_table(CLAIM_REQUEST)
    }

    fn claim_request_currency(&self) -> EnsureForeignKey {
        let foreign_key = ForeignKey::new("fk_currency_id", [CURRENCY_ID], CURRENCY_TYPE, [CURRENCY_ID])
            .on_delete(ReferenceAction::Restrict)
            .on_update(ReferenceAction::Cascade);

        EnsureForeignKey::new(CLAIM_REQUEST, foreign_key)
    }
}

impl Default for AlignCurrencyCodes {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl MigrationStep for AlignCurrencyCodes {
    fn version(&self) -> MigrationVersion {
        MigrationVersion::new(vec![5, 7, 1])
    }

    fn description(&self) -> &str {
        "Align currency code columns and add the claim request currency foreign key"
    }

    #[instrument(skip_all)]
    async fn up(&self, context: &dyn MigrationContext) -> Result {
        let outcome = self.repair().apply(context).await?;
        let created = self.claim_request_currency().apply(context).await?;

        info!(?outcome, created_claim_request_foreign_key = created, "Currency codes are aligned");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elefant_migrate::test_helpers::{
        init_tracing, varchar_column, FailurePoint, InMemoryDatabase, SchemaOperation,
    };
    use elefant_migrate::{MigrationError, MigrationRunner, MigrationRunnerOptions, Table, TableColumn};

    fn currency_fk(name: &str) -> ForeignKey {
        ForeignKey::new(name, [CURRENCY_ID], CURRENCY_TYPE, [CURRENCY_ID])
    }

    fn tables(currency_length: i32, claim_request_fk: bool) -> Vec<Table> {
        let mut claim_request = Table::new(CLAIM_REQUEST)
            .with_column(TableColumn::new("id", "int4"))
            .with_column(varchar_column(CURRENCY_ID, 3));
        if claim_request_fk {
            claim_request = claim_request.with_foreign_key(
                currency_fk("fk_currency_id")
                    .on_delete(ReferenceAction::Restrict)
                    .on_update(ReferenceAction::Cascade),
            );
        }

        vec![
            Table::new(CURRENCY_TYPE)
                .with_column(varchar_column(CURRENCY_ID, currency_length))
                .with_column(varchar_column("currency_name", 70)),
            Table::new(PAY_GRADE_CURRENCY)
                .with_column(TableColumn::new("pay_grade_id", "int4"))
                .with_column(varchar_column(CURRENCY_ID, currency_length))
                .with_foreign_key(
                    currency_fk("ohrm_pay_grade_currency_ibfk_1")
                        .on_delete(ReferenceAction::Cascade),
                )
                .with_foreign_key(ForeignKey::new(
                    "ohrm_pay_grade_currency_ibfk_2",
                    ["pay_grade_id"],
                    "ohrm_pay_grade",
                    ["id"],
                )),
            Table::new(BASIC_SALARY)
                .with_column(TableColumn::new("id", "int4"))
                .with_column(varchar_column(CURRENCY_ID, currency_length))
                .with_foreign_key(
                    currency_fk("hs_hr_emp_basicsalary_ibfk_3")
                        .on_delete(ReferenceAction::Cascade),
                ),
            claim_request,
            Table::new("ohrm_pay_grade").with_column(TableColumn::new("id", "int4")),
        ]
    }

    fn database(tables: Vec<Table>) -> InMemoryDatabase {
        tables
            .into_iter()
            .fold(InMemoryDatabase::new(), |db, table| db.with_table(table))
    }

    fn legacy_database() -> InMemoryDatabase {
        database(tables(6, false))
    }

    #[tokio::test]
    async fn repairs_a_legacy_schema() {
        init_tracing();
        let db = legacy_database();

        AlignCurrencyCodes::default().up(&db).await.unwrap();

        let currency = db.column(CURRENCY_TYPE, CURRENCY_ID);
        assert_eq!(currency.type_expression(), "varchar(3)");
        for table in [PAY_GRADE_CURRENCY, BASIC_SALARY, CLAIM_REQUEST] {
            let column = db.column(table, CURRENCY_ID);
            assert_eq!(column.type_expression(), currency.type_expression());
            assert_eq!(column.collation, currency.collation);
        }

        let pay_grade = db.table(PAY_GRADE_CURRENCY);
        assert_eq!(
            pay_grade.foreign_key("ohrm_pay_grade_currency_ibfk_1").map(|fk| fk.delete_action),
            Some(ReferenceAction::Cascade)
        );
        assert!(pay_grade.has_foreign_key("ohrm_pay_grade_currency_ibfk_2"));
        assert_eq!(
            db.table(BASIC_SALARY).foreign_key("hs_hr_emp_basicsalary_ibfk_3").map(|fk| fk.delete_action),
            Some(ReferenceAction::Cascade)
        );

        let claim_fk = db.table(CLAIM_REQUEST).foreign_key("fk_currency_id").cloned().unwrap();
        assert_eq!(claim_fk.delete_action, ReferenceAction::Restrict);
        assert_eq!(claim_fk.update_action, ReferenceAction::Cascade);
    }

    #[tokio::test]
    async fn second_run_performs_no_ddl() {
        let db = legacy_database();
        let step = AlignCurrencyCodes::default();
        step.up(&db).await.unwrap();
        db.clear_operations();

        step.up(&db).await.unwrap();

        assert!(db.ddl_operations().is_empty());
    }

    #[tokio::test]
    async fn existing_claim_request_foreign_key_is_not_duplicated() {
        let db = database(tables(3, true));

        AlignCurrencyCodes::default().up(&db).await.unwrap();

        assert!(db.ddl_operations().is_empty());
        let claim_request = db.table(CLAIM_REQUEST);
        assert_eq!(
            claim_request
                .foreign_keys
                .iter()
                .filter(|fk| fk.name == "fk_currency_id")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn missing_claim_request_foreign_key_is_the_only_change() {
        let db = database(tables(3, false));

        AlignCurrencyCodes::default().up(&db).await.unwrap();

        assert_eq!(
            db.ddl_operations(),
            vec![SchemaOperation::AddForeignKey {
                table: CLAIM_REQUEST.to_string(),
                name: "fk_currency_id".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn existing_claim_request_foreign_key_survives_the_repair() {
        let db = database(tables(6, true));
        // The foreign key can only exist while both sides agree.
        db.add_table(
            Table::new(CLAIM_REQUEST)
                .with_column(varchar_column(CURRENCY_ID, 6))
                .with_foreign_key(
                    currency_fk("fk_currency_id")
                        .on_delete(ReferenceAction::Restrict)
                        .on_update(ReferenceAction::Cascade),
                ),
        );

        AlignCurrencyCodes::default().up(&db).await.unwrap();

        assert_eq!(db.column(CLAIM_REQUEST, CURRENCY_ID).data_type_length, Some(3));
        let claim_fk = db.table(CLAIM_REQUEST).foreign_key("fk_currency_id").cloned().unwrap();
        assert_eq!(claim_fk.delete_action, ReferenceAction::Restrict);
        assert_eq!(claim_fk.update_action, ReferenceAction::Cascade);
    }

    #[tokio::test]
    async fn table_order_does_not_change_the_result() {
        let forward = legacy_database();
        let reversed = database(tables(6, false).into_iter().rev().collect());

        AlignCurrencyCodes::default().up(&forward).await.unwrap();
        AlignCurrencyCodes::default().up(&reversed).await.unwrap();

        for table in [CURRENCY_TYPE, PAY_GRADE_CURRENCY, BASIC_SALARY, CLAIM_REQUEST] {
            assert_eq!(forward.table(table), reversed.table(table), "table {} differs", table);
        }
    }

    #[tokio::test]
    async fn configured_collation_is_applied() {
        let db = legacy_database();

        AlignCurrencyCodes::new(Some("C".to_string())).up(&db).await.unwrap();

        for table in [CURRENCY_TYPE, PAY_GRADE_CURRENCY, BASIC_SALARY, CLAIM_REQUEST] {
            assert_eq!(db.column(table, CURRENCY_ID).collation.as_deref(), Some("C"));
        }
    }

    #[tokio::test]
    async fn failure_mid_repair_leaves_the_version_unrecorded() {
        let db = legacy_database();
        db.fail_at(FailurePoint::ChangeColumn {
            table: BASIC_SALARY.to_string(),
        });
        let runner = MigrationRunner::new(&db, &db, MigrationRunnerOptions::default());
        let steps: Vec<Box<dyn MigrationStep>> = vec![Box::new(AlignCurrencyCodes::default())];

        let err = runner.apply_pending(&steps).await.unwrap_err();

        assert!(matches!(err, MigrationError::MigrationFailed { ref version, .. } if version.to_string() == "5.7.1"));
        assert!(db.applied().is_empty());
        assert_eq!(db.column(CURRENCY_TYPE, CURRENCY_ID).data_type_length, Some(6));
        assert!(db.table(BASIC_SALARY).has_foreign_key("hs_hr_emp_basicsalary_ibfk_3"));

        db.clear_failures();
        let report = runner.apply_pending(&steps).await.unwrap();
        assert_eq!(report.applied, vec!["5.7.1".parse::<MigrationVersion>().unwrap()]);
    }

    #[test]
    fn installer_ships_the_currency_step() {
        let steps = crate::migrations(&crate::InstallerOptions::default());

        let versions: Vec<String> = steps.iter().map(|s| s.version().to_string()).collect();
        assert_eq!(versions, vec!["5.7.1"]);
    }
}
