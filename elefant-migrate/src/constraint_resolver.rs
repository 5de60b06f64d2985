//! Finds the foreign keys that point at a table, no matter which migration created them or
//! what they are called.

use crate::{ForeignKey, Table};

/// A foreign key together with the table that owns it.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ReferencingConstraint {
    pub owning_table: String,
    pub constraint: ForeignKey,
}

impl ReferencingConstraint {
    pub fn name(&self) -> &str {
        &self.constraint.name
    }
}

/// All foreign keys on `table` that reference `target_table`, in the order the table reports them.
pub fn find_constraints_referencing(table: &Table, target_table: &str) -> Vec<ReferencingConstraint> {
    table
        .foreign_keys
        .iter()
        .filter(|fk| fk.references(target_table))
        .map(|fk| ReferencingConstraint {
            owning_table: table.name.clone(),
            constraint: fk.clone(),
        })
        .collect()
}

/// An ordered collection of foreign keys referencing one table, gathered from several tables.
///
/// Constraint names are only unique per table, so entries are keyed by owning table and name.
/// Iteration order is the order the constraints were collected in.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ReferencingConstraints {
    entries: Vec<ReferencingConstraint>,
}

impl ReferencingConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the foreign keys on `table` that reference `target_table`. Returns how many new
    /// constraints were added.
    pub fn collect(&mut self, table: &Table, target_table: &str) -> usize {
        let before = self.entries.len();

        for found in find_constraints_referencing(table, target_table) {
            if !self.contains(&found.owning_table, found.name()) {
                self.entries.push(found);
            }
        }

        self.entries.len() - before
    }

    pub fn contains(&self, owning_table: &str, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.owning_table == owning_table && e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferencingConstraint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// The distinct `(table, column)` pairs on the referencing side that point at
    /// `referenced_column`, in collection order.
    pub fn local_columns(&self, referenced_column: &str) -> Vec<(&str, &str)> {
        let mut columns: Vec<(&str, &str)> = Vec::new();

        for entry in &self.entries {
            for (local, referenced) in entry.constraint.column_pairs() {
                let pair = (entry.owning_table.as_str(), local);
                if referenced == referenced_column && !columns.contains(&pair) {
                    columns.push(pair);
                }
            }
        }

        columns
    }
}

impl<'a> IntoIterator for &'a ReferencingConstraints {
    type Item = &'a ReferencingConstraint;
    type IntoIter = std::slice::Iter<'a, ReferencingConstraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
