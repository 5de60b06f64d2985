use std::fmt::{Display, Formatter};
use crate::postgres_client_wrapper::FromPgChar;
use crate::MigrationError;

/// A foreign key as it exists on its owning table.
///
/// `columns` and `referenced_columns` are in key order, so the n'th local column references
/// the n'th referenced column.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

impl ForeignKey {
    pub fn new<S: Into<String>>(
        name: &str,
        columns: impl IntoIterator<Item = S>,
        referenced_table: &str,
        referenced_columns: impl IntoIterator<Item = S>,
    ) -> Self {
        ForeignKey {
            name: name.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_schema: None,
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            update_action: ReferenceAction::NoAction,
            delete_action: ReferenceAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferenceAction) -> Self {
        self.delete_action = action;
        self
    }

    pub fn on_update(mut self, action: ReferenceAction) -> Self {
        self.update_action = action;
        self
    }

    /// Pairs of (local column, referenced column).
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.referenced_columns.iter().map(String::as_str))
    }

    pub fn references(&self, table: &str) -> bool {
        self.referenced_table == table
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum ReferenceAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferenceAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferenceAction::NoAction => "no action",
            ReferenceAction::Restrict => "restrict",
            ReferenceAction::Cascade => "cascade",
            ReferenceAction::SetNull => "set null",
            ReferenceAction::SetDefault => "set default",
        }
    }
}

impl Display for ReferenceAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromPgChar for ReferenceAction {
    fn from_pg_char(c: char) -> Result<Self, MigrationError> {
        match c {
            'a' => Ok(ReferenceAction::NoAction),
            'r' => Ok(ReferenceAction::Restrict),
            'c' => Ok(ReferenceAction::Cascade),
            'n' => Ok(ReferenceAction::SetNull),
            'd' => Ok(ReferenceAction::SetDefault),
            _ => Err(MigrationError::UnknownReferenceAction(c.to_string())),
        }
    }
}
