//! Reusable building blocks for migration steps that fix up foreign keys.

use tracing::{debug, info, instrument, warn};
use crate::capabilities::{MigrationContext, SchemaManager};
use crate::constraint_resolver::ReferencingConstraints;
use crate::planner::{check_foreign_key_compatibility, matches_spec, plan_alteration};
use crate::{ColumnSpec, ForeignKey, Result};

/// What [`ColumnConsistencyRepair::apply`] ended up doing.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum RepairOutcome {
    /// Every inspected column already had the target shape, nothing was changed.
    AlreadyConsistent,
    Repaired {
        recreated_constraints: usize,
        altered_columns: usize,
    },
}

/// Brings a referenced column and every column pointing at it to the same [`ColumnSpec`].
///
/// A foreign key cannot be kept while its two sides are being changed to a different width, so
/// every foreign key from the dependent tables to the referenced table is dropped first and
/// recreated from its previous definition afterward.
///
/// Without transactional DDL a failure half way leaves the constraints dropped.
#[derive(Debug, Clone)]
pub struct ColumnConsistencyRepair {
    referenced_table: String,
    column: String,
    spec: ColumnSpec,
    dependent_tables: Vec<String>,
    aligned_tables: Vec<String>,
    checked_tables: Vec<String>,
}

impl ColumnConsistencyRepair {
    pub fn new(referenced_table: &str, column: &str, spec: ColumnSpec) -> Self {
        ColumnConsistencyRepair {
            referenced_table: referenced_table.to_string(),
            column: column.to_string(),
            spec,
            dependent_tables: Vec::new(),
            aligned_tables: Vec::new(),
            checked_tables: Vec::new(),
        }
    }

    /// A table whose foreign keys to the referenced table are dropped and recreated around the
    /// change. Tables are searched in the order they are added.
    pub fn dependent_table(mut self, table: &str) -> Self {
        if !self.dependent_tables.iter().any(|t| t == table) {
            self.dependent_tables.push(table.to_string());
        }
        self
    }

    /// A dependent table whose column is altered during a repair even if no foreign key currently
    /// connects it to the referenced table.
    pub fn aligned_table(mut self, table: &str) -> Self {
        if !self.aligned_tables.iter().any(|t| t == table) {
            self.aligned_tables.push(table.to_string());
        }
        self.dependent_table(table)
    }

    /// An aligned table whose column also decides whether the repair is needed at all.
    pub fn checked_table(mut self, table: &str) -> Self {
        if !self.checked_tables.iter().any(|t| t == table) {
            self.checked_tables.push(table.to_string());
        }
        self.aligned_table(table)
    }

    pub fn spec(&self) -> &ColumnSpec {
        &self.spec
    }

    /// True if the referenced column and the column of every checked table already have the
    /// target shape.
    pub async fn is_consistent(&self, schema_manager: &dyn SchemaManager) -> Result<bool> {
        for table in std::iter::once(&self.referenced_table).chain(self.checked_tables.iter()) {
            let snapshot = schema_manager.introspect_table(table).await?;
            let column = snapshot.require_column(&self.column)?;

            if !matches_spec(column, &self.spec) {
                debug!(
                    table = %table,
                    data_type = %column.type_expression(),
                    collation = ?column.collation,
                    "Column does not match the target column spec"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Finds every foreign key from the dependent tables to the referenced table.
    pub async fn collect_constraints(&self, schema_manager: &dyn SchemaManager) -> Result<ReferencingConstraints> {
        let mut constraints = ReferencingConstraints::new();

        for table in &self.dependent_tables {
            let snapshot = schema_manager.introspect_table(table).await?;
            let added = constraints.collect(&snapshot, &self.referenced_table);
            debug!(table = %table, added, "Collected foreign keys");
        }

        Ok(constraints)
    }

    #[instrument(skip_all, fields(table = %self.referenced_table, column = %self.column))]
    pub async fn apply(&self, context: &dyn MigrationContext) -> Result<RepairOutcome> {
        let schema_manager = context.schema_manager();
        let schema_helper = context.schema_helper();

        if self.is_consistent(schema_manager).await? {
            info!("Columns are already consistent, skipping repair");
            return Ok(RepairOutcome::AlreadyConsistent);
        }

        let constraints = self.collect_constraints(schema_manager).await?;
        info!(constraints = ?constraints.names(), "Dropping foreign keys before altering columns");

        for constraint in &constraints {
            schema_helper
                .drop_foreign_keys(&constraint.owning_table, &[constraint.constraint.name.clone()])
                .await?;
        }

        let mut columns: Vec<(String, String)> = vec![(self.referenced_table.clone(), self.column.clone())];
        for (table, column) in constraints.local_columns(&self.column) {
            columns.push((table.to_string(), column.to_string()));
        }
        for table in &self.aligned_tables {
            let pair = (table.clone(), self.column.clone());
            if !columns.contains(&pair) {
                columns.push(pair);
            }
        }

        let mut altered_columns = 0;
        for (table, column) in &columns {
            let snapshot = schema_manager.introspect_table(table).await?;
            let alteration = plan_alteration(&snapshot, column, &self.spec)?;

            if alteration.is_noop() {
                debug!(table = %table, column = %column, "Column already matches");
                continue;
            }

            schema_helper
                .change_column(&alteration.table, &alteration.column, &alteration.spec)
                .await?;
            altered_columns += 1;
        }

        let referenced = schema_manager.introspect_table(&self.referenced_table).await?;
        for constraint in &constraints {
            let owning = schema_manager.introspect_table(&constraint.owning_table).await?;
            check_foreign_key_compatibility(&owning, &constraint.constraint, &referenced)?;

            schema_helper
                .add_foreign_key(&constraint.owning_table, &constraint.constraint)
                .await?;
        }

        info!(
            recreated_constraints = constraints.len(),
            altered_columns, "Repaired column consistency"
        );

        Ok(RepairOutcome::Repaired {
            recreated_constraints: constraints.len(),
            altered_columns,
        })
    }
}

/// Creates a foreign key unless a foreign key with the same name already exists on the table.
#[derive(Debug, Clone)]
pub struct EnsureForeignKey {
    table: String,
    foreign_key: ForeignKey,
}

impl EnsureForeignKey {
    pub fn new(table: &str, foreign_key: ForeignKey) -> Self {
        EnsureForeignKey {
            table: table.to_string(),
            foreign_key,
        }
    }

    /// Returns whether the foreign key was created.
    #[instrument(skip_all, fields(table = %self.table, name = %self.foreign_key.name))]
    pub async fn apply(&self, context: &dyn MigrationContext) -> Result<bool> {
        let schema_manager = context.schema_manager();
        let owning = schema_manager.introspect_table(&self.table).await?;

        if let Some(existing) = owning.foreign_key(&self.foreign_key.name) {
            if existing.columns != self.foreign_key.columns
                || existing.referenced_table != self.foreign_key.referenced_table
                || existing.referenced_columns != self.foreign_key.referenced_columns
            {
                warn!(?existing, "A foreign key with the same name but a different definition exists");
            }
            debug!("Foreign key already exists");
            return Ok(false);
        }

        let referenced = schema_manager
            .introspect_table(&self.foreign_key.referenced_table)
            .await?;
        check_foreign_key_compatibility(&owning, &self.foreign_key, &referenced)?;

        context
            .schema_helper()
            .add_foreign_key(&self.table, &self.foreign_key)
            .await?;
        info!("Created foreign key");

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{init_tracing, varchar_column, FailurePoint, InMemoryDatabase, SchemaOperation};
    use crate::{MigrationError, ReferenceAction, Table};
    use itertools::Itertools;

    const CURRENCY: &str = "hs_hr_currency_type";
    const PAY_GRADE: &str = "ohrm_pay_grade_currency";
    const SALARY: &str = "hs_hr_emp_basicsalary";
    const CLAIM: &str = "ohrm_claim_request";

    fn currency_fk(name: &str) -> ForeignKey {
        ForeignKey::new(name, ["currency_id"], CURRENCY, ["currency_id"])
    }

    fn widened_database() -> InMemoryDatabase {
        InMemoryDatabase::new()
            .with_table(Table::new(CURRENCY).with_column(varchar_column("currency_id", 6)))
            .with_table(
                Table::new(PAY_GRADE)
                    .with_column(varchar_column("currency_id", 6))
                    .with_foreign_key(currency_fk("ohrm_pay_grade_currency_ibfk_1").on_delete(ReferenceAction::Cascade)),
            )
            .with_table(
                Table::new(SALARY)
                    .with_column(varchar_column("currency_id", 6))
                    .with_foreign_key(currency_fk("hs_hr_emp_basicsalary_ibfk_3")),
            )
            .with_table(Table::new(CLAIM).with_column(varchar_column("currency_id", 3)))
    }

    fn repair() -> ColumnConsistencyRepair {
        ColumnConsistencyRepair::new(CURRENCY, "currency_id", ColumnSpec::varchar(3))
            .checked_table(PAY_GRADE)
            .checked_table(SALARY)
            .aligned_table(CLAIM)
    }

    #[tokio::test]
    async fn repairs_columns_and_recreates_foreign_keys() {
        init_tracing();
        let db = widened_database();

        let outcome = repair().apply(&db).await.unwrap();

        assert_eq!(
            outcome,
            RepairOutcome::Repaired {
                recreated_constraints: 2,
                altered_columns: 3
            }
        );

        let expected = db.column(CURRENCY, "currency_id");
        assert_eq!(expected.data_type_length, Some(3));
        for table in [PAY_GRADE, SALARY, CLAIM] {
            let column = db.column(table, "currency_id");
            assert_eq!(column.type_expression(), expected.type_expression());
            assert_eq!(column.collation, expected.collation);
        }

        let pay_grade_fk = db.table(PAY_GRADE).foreign_key("ohrm_pay_grade_currency_ibfk_1").cloned().unwrap();
        assert_eq!(pay_grade_fk.delete_action, ReferenceAction::Cascade);
        assert!(db.table(SALARY).has_foreign_key("hs_hr_emp_basicsalary_ibfk_3"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Role {
        Checked,
        Aligned,
        Dependent,
    }

    #[tokio::test]
    async fn table_order_does_not_change_the_repair() {
        const EXPENSE: &str = "ohrm_expense";
        let tables = [
            (PAY_GRADE, Role::Checked),
            (SALARY, Role::Checked),
            (CLAIM, Role::Aligned),
            (EXPENSE, Role::Dependent),
        ];

        let mut results = Vec::new();
        for order in tables.iter().permutations(tables.len()) {
            let repair = order.iter().fold(
                ColumnConsistencyRepair::new(CURRENCY, "currency_id", ColumnSpec::varchar(3)),
                |repair, (table, role)| match role {
                    Role::Checked => repair.checked_table(table),
                    Role::Aligned => repair.aligned_table(table),
                    Role::Dependent => repair.dependent_table(table),
                },
            );
            let db = widened_database();
            db.add_table(
                Table::new(EXPENSE)
                    .with_column(varchar_column("currency_id", 6))
                    .with_foreign_key(currency_fk("ohrm_expense_currency")),
            );

            let outcome = repair.apply(&db).await.unwrap();

            let snapshot = [CURRENCY, PAY_GRADE, SALARY, CLAIM, EXPENSE].map(|t| db.table(t));
            results.push((order, outcome, snapshot));
        }

        let (_, first_outcome, first_tables) = &results[0];
        assert_eq!(
            *first_outcome,
            RepairOutcome::Repaired {
                recreated_constraints: 3,
                altered_columns: 4
            }
        );
        assert_eq!(first_tables[4].column("currency_id").and_then(|c| c.data_type_length), Some(3));
        for (order, outcome, tables) in &results[1..] {
            assert_eq!(outcome, first_outcome, "order {:?}", order);
            similar_asserts::assert_eq!(tables, first_tables, "order {:?}", order);
        }
    }

    #[tokio::test]
    async fn drops_before_altering_and_recreates_last() {
        let db = widened_database();

        repair().apply(&db).await.unwrap();

        let change = |table: &str| SchemaOperation::ChangeColumn {
            table: table.to_string(),
            column: "currency_id".to_string(),
            spec: ColumnSpec::varchar(3),
        };

        similar_asserts::assert_eq!(
            db.ddl_operations(),
            vec![
                SchemaOperation::DropForeignKey {
                    table: PAY_GRADE.to_string(),
                    name: "ohrm_pay_grade_currency_ibfk_1".to_string()
                },
                SchemaOperation::DropForeignKey {
                    table: SALARY.to_string(),
                    name: "hs_hr_emp_basicsalary_ibfk_3".to_string()
                },
                change(CURRENCY),
                change(PAY_GRADE),
                change(SALARY),
                SchemaOperation::AddForeignKey {
                    table: PAY_GRADE.to_string(),
                    name: "ohrm_pay_grade_currency_ibfk_1".to_string()
                },
                SchemaOperation::AddForeignKey {
                    table: SALARY.to_string(),
                    name: "hs_hr_emp_basicsalary_ibfk_3".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let db = widened_database();
        repair().apply(&db).await.unwrap();
        db.clear_operations();

        let outcome = repair().apply(&db).await.unwrap();

        assert_eq!(outcome, RepairOutcome::AlreadyConsistent);
        assert!(db.ddl_operations().is_empty());
    }

    #[tokio::test]
    async fn finds_foreign_keys_regardless_of_name() {
        let db = widened_database();
        db.add_table(
            Table::new(SALARY)
                .with_column(varchar_column("currency_id", 6))
                .with_foreign_key(currency_fk("some_renamed_constraint")),
        );

        let constraints = repair().collect_constraints(&db).await.unwrap();
        assert_eq!(
            constraints.names(),
            vec!["ohrm_pay_grade_currency_ibfk_1", "some_renamed_constraint"]
        );

        repair().apply(&db).await.unwrap();
        assert!(db.table(SALARY).has_foreign_key("some_renamed_constraint"));
    }

    #[tokio::test]
    async fn a_mismatched_checked_table_triggers_the_repair() {
        let db = widened_database();
        repair().apply(&db).await.unwrap();
        db.add_table(Table::new(SALARY).with_column(varchar_column("currency_id", 6)));
        db.clear_operations();

        assert!(!repair().is_consistent(&db).await.unwrap());

        let outcome = repair().apply(&db).await.unwrap();
        assert_eq!(
            outcome,
            RepairOutcome::Repaired {
                recreated_constraints: 1,
                altered_columns: 1
            }
        );
        assert_eq!(db.column(SALARY, "currency_id").data_type_length, Some(3));
    }

    #[tokio::test]
    async fn a_failing_alteration_stops_the_repair() {
        let db = widened_database();
        db.fail_at(FailurePoint::ChangeColumn {
            table: SALARY.to_string(),
        });

        let err = repair().apply(&db).await.unwrap_err();

        assert!(matches!(err, MigrationError::DdlExecution { .. }));
        assert!(!db
            .ddl_operations()
            .iter()
            .any(|op| matches!(op, SchemaOperation::AddForeignKey { .. })));
    }

    #[tokio::test]
    async fn missing_table_is_reported() {
        let db = InMemoryDatabase::new().with_table(Table::new(CURRENCY).with_column(varchar_column("currency_id", 6)));

        let err = repair().apply(&db).await.unwrap_err();

        assert!(matches!(err, MigrationError::TableNotFound(t) if t == PAY_GRADE));
        assert!(db.ddl_operations().is_empty());
    }

    fn claim_fk() -> ForeignKey {
        currency_fk("fk_currency_id")
            .on_delete(ReferenceAction::Restrict)
            .on_update(ReferenceAction::Cascade)
    }

    #[tokio::test]
    async fn ensure_creates_a_missing_foreign_key() {
        let db = widened_database();
        repair().apply(&db).await.unwrap();

        let created = EnsureForeignKey::new(CLAIM, claim_fk()).apply(&db).await.unwrap();

        assert!(created);
        let fk = db.table(CLAIM).foreign_key("fk_currency_id").cloned().unwrap();
        assert_eq!(fk.delete_action, ReferenceAction::Restrict);
        assert_eq!(fk.update_action, ReferenceAction::Cascade);
    }

    #[tokio::test]
    async fn ensure_leaves_an_existing_foreign_key_alone() {
        let db = widened_database();
        repair().apply(&db).await.unwrap();
        db.add_table(
            Table::new(CLAIM)
                .with_column(varchar_column("currency_id", 3))
                .with_foreign_key(currency_fk("fk_currency_id")),
        );
        db.clear_operations();

        let created = EnsureForeignKey::new(CLAIM, claim_fk()).apply(&db).await.unwrap();

        assert!(!created);
        assert!(db.ddl_operations().is_empty());
    }

    #[tokio::test]
    async fn ensure_refuses_mismatched_columns() {
        let db = widened_database();

        let err = EnsureForeignKey::new(CLAIM, claim_fk()).apply(&db).await.unwrap_err();

        assert!(matches!(err, MigrationError::ConstraintConflict { .. }));
        assert!(!db.table(CLAIM).has_foreign_key("fk_currency_id"));
    }
}
