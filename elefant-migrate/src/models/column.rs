/// A column as it currently exists in the database.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct TableColumn {
    pub name: String,
    pub ordinal_position: i32,
    /// The Postgres type name, e.g. `varchar`, `bpchar` or `int4`.
    pub data_type: String,
    /// The declared character length, if the type has one.
    pub data_type_length: Option<i32>,
    pub is_nullable: bool,
    /// The encoding character data is stored in. `None` for non-character columns.
    pub charset: Option<String>,
    /// `None` when the column uses the database default collation.
    pub collation: Option<String>,
}

impl TableColumn {
    pub fn new(name: &str, data_type: &str) -> Self {
        TableColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            ..Default::default()
        }
    }

    /// The type as it would be written in DDL, including the length modifier.
    pub fn type_expression(&self) -> String {
        type_expression(&self.data_type, self.data_type_length)
    }
}

pub(crate) fn type_expression(data_type: &str, length: Option<i32>) -> String {
    let name = match data_type {
        "bpchar" => "char",
        other => other,
    };

    match length {
        Some(length) => format!("{}({})", name, length),
        None => name.to_string(),
    }
}
