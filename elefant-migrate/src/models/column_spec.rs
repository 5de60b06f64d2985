use crate::models::column::type_expression;

/// The shape a column should be altered into.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ColumnSpec {
    pub data_type: String,
    pub nullable: bool,
    pub length: Option<i32>,
    /// Compared against the column's charset when set. Postgres stores the encoding per
    /// database, so this is never part of the generated DDL.
    pub charset: Option<String>,
    pub collation: Option<String>,
}

impl ColumnSpec {
    pub fn new(data_type: &str) -> Self {
        ColumnSpec {
            data_type: data_type.to_string(),
            nullable: true,
            length: None,
            charset: None,
            collation: None,
        }
    }

    /// A `not null` `varchar(length)`.
    pub fn varchar(length: i32) -> Self {
        ColumnSpec {
            length: Some(length),
            nullable: false,
            ..Self::new("varchar")
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn type_expression(&self) -> String {
        type_expression(&self.data_type, self.length)
    }
}
