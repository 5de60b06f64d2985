//! Decides whether columns on either side of a foreign key agree, and what to change when they
//! don't. Nothing in here touches the database.

use crate::{ColumnSpec, ForeignKey, MigrationError, Result, Table, TableColumn};

/// True if the two columns differ in type, length, charset or collation, in which case a foreign
/// key between them cannot be created.
///
/// Charsets are only compared when both columns report one.
pub fn needs_correction(column_a: &TableColumn, column_b: &TableColumn) -> bool {
    column_a.data_type != column_b.data_type
        || column_a.data_type_length != column_b.data_type_length
        || charset_differs(column_a.charset.as_deref(), column_b.charset.as_deref())
        || column_a.collation != column_b.collation
}

/// True if the column already looks exactly like `spec`, nullability included.
pub fn matches_spec(column: &TableColumn, spec: &ColumnSpec) -> bool {
    column.data_type == spec.data_type
        && column.data_type_length == spec.length
        && !charset_differs(column.charset.as_deref(), spec.charset.as_deref())
        && column.collation == spec.collation
        && column.is_nullable == spec.nullable
}

fn charset_differs(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// A single column change, ready to be handed to a [`crate::SchemaHelper`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AlterColumnOp {
    pub table: String,
    pub column: String,
    pub spec: ColumnSpec,
    /// The column as it was when the change was planned.
    pub current: TableColumn,
}

impl AlterColumnOp {
    /// True if applying the change would not alter anything.
    pub fn is_noop(&self) -> bool {
        matches_spec(&self.current, &self.spec)
    }
}

pub fn plan_alteration(table: &Table, column_name: &str, target_spec: &ColumnSpec) -> Result<AlterColumnOp> {
    let current = table.require_column(column_name)?;

    Ok(AlterColumnOp {
        table: table.name.clone(),
        column: column_name.to_string(),
        spec: target_spec.clone(),
        current: current.clone(),
    })
}

/// Verifies every column pair of `foreign_key` would be accepted by the database.
///
/// `owning_table` and `referenced_table` must be fresh snapshots.
pub fn check_foreign_key_compatibility(
    owning_table: &Table,
    foreign_key: &ForeignKey,
    referenced_table: &Table,
) -> Result {
    for (local, referenced) in foreign_key.column_pairs() {
        let local_column = owning_table.require_column(local)?;
        let referenced_column = referenced_table.require_column(referenced)?;

        if needs_correction(local_column, referenced_column) {
            return Err(MigrationError::ConstraintConflict {
                constraint: foreign_key.name.clone(),
                table: owning_table.name.clone(),
                column: local.to_string(),
                referenced_table: referenced_table.name.clone(),
                referenced_column: referenced.to_string(),
            });
        }
    }

    Ok(())
}
