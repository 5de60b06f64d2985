use crate::models::column::TableColumn;
use crate::models::foreign_key::ForeignKey;
use crate::{MigrationError, Result};

/// A snapshot of a table, as returned by introspection.
///
/// Snapshots are never refreshed. Introspect again after changing the schema.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<TableColumn>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Table {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Appends the column, placing it after the existing ones.
    pub fn with_column(mut self, mut column: TableColumn) -> Self {
        column.ordinal_position = self.columns.len() as i32 + 1;
        self.columns.push(column);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&TableColumn> {
        self.column(name).ok_or_else(|| MigrationError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    pub fn has_foreign_key(&self, name: &str) -> bool {
        self.foreign_key(name).is_some()
    }
}
