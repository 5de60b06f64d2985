use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter, Quotable, QuotableIter};
use crate::{ColumnSpec, ForeignKey};
use crate::helpers::StringExt;

/// Builds `alter table` statements.
///
/// Every call to [`DdlQueryBuilder::alter_table`] starts a new statement, the actions added to
/// the returned builder are comma separated within that statement.
pub struct DdlQueryBuilder<'q> {
    sql: String,
    identifier_quoter: &'q IdentifierQuoter,
    statement_open: bool,
}

impl<'a> DdlQueryBuilder<'a> {
    pub fn new(identifier_quoter: &'a IdentifierQuoter) -> Self {
        Self {
            sql: String::new(),
            identifier_quoter,
            statement_open: false,
        }
    }

    pub fn alter_table(&mut self, schema: &str, table: &str) -> DdlAlterTableBuilder<'a, '_> {
        self.close_statement();
        if !self.sql.is_empty() {
            self.sql.push('\n');
        }

        self.sql.push_str("alter table ");
        self.sql
            .push_str(&self.identifier_quoter.quote_qualified(schema, table));
        self.statement_open = true;

        DdlAlterTableBuilder {
            query_builder: self,
            has_first_action: false,
        }
    }

    pub fn build(mut self) -> String {
        self.close_statement();

        self.sql
    }

    fn close_statement(&mut self) {
        if self.statement_open {
            self.sql.push(';');
            self.statement_open = false;
        }
    }
}

pub struct DdlAlterTableBuilder<'q, 'b> {
    query_builder: &'b mut DdlQueryBuilder<'q>,
    has_first_action: bool,
}

impl DdlAlterTableBuilder<'_, '_> {
    /// Changes type and collation. Nullability is handled separately by
    /// [`DdlAlterTableBuilder::set_nullable`].
    pub fn alter_column_type(&mut self, column: &str, spec: &ColumnSpec) -> &mut Self {
        self.start_new_action();
        let quoter = self.query_builder.identifier_quoter;
        let sql = &mut self.query_builder.sql;

        sql.push_str("alter column ");
        sql.push_str(&column.quote(quoter, AttemptedKeywordUsage::ColumnName));
        sql.push_str(" type ");
        sql.push_str(&spec.type_expression());

        if let Some(collation) = &spec.collation {
            sql.push_str(" collate ");
            sql.push_str(&quoter.quote_collation(collation));
        }

        self
    }

    pub fn set_nullable(&mut self, column: &str, nullable: bool) -> &mut Self {
        self.start_new_action();
        let quoter = self.query_builder.identifier_quoter;
        let sql = &mut self.query_builder.sql;

        sql.push_str("alter column ");
        sql.push_str(&column.quote(quoter, AttemptedKeywordUsage::ColumnName));
        if nullable {
            sql.push_str(" drop not null");
        } else {
            sql.push_str(" set not null");
        }

        self
    }

    /// Adds the foreign key. A foreign key without a referenced schema is assumed to reference a
    /// table in `default_schema`.
    pub fn add_foreign_key(&mut self, foreign_key: &ForeignKey, default_schema: &str) -> &mut Self {
        self.start_new_action();
        let quoter = self.query_builder.identifier_quoter;
        let sql = &mut self.query_builder.sql;

        sql.push_str("add constraint ");
        sql.push_str(&foreign_key.name.quote(quoter, AttemptedKeywordUsage::Other));
        sql.push_str(" foreign key (");
        sql.push_join(
            ", ",
            foreign_key
                .columns
                .iter()
                .quote(quoter, AttemptedKeywordUsage::ColumnName),
        );
        sql.push_str(") references ");

        let referenced_schema = foreign_key
            .referenced_schema
            .as_deref()
            .unwrap_or(default_schema);
        sql.push_str(&quoter.quote_qualified(referenced_schema, &foreign_key.referenced_table));
        sql.push_str(" (");
        sql.push_join(
            ", ",
            foreign_key
                .referenced_columns
                .iter()
                .quote(quoter, AttemptedKeywordUsage::ColumnName),
        );
        sql.push(')');

        sql.push_str(" on delete ");
        sql.push_str(foreign_key.delete_action.as_sql());
        sql.push_str(" on update ");
        sql.push_str(foreign_key.update_action.as_sql());

        self
    }

    pub fn drop_constraint(&mut self, name: &str) -> &mut Self {
        self.start_new_action();
        let quoter = self.query_builder.identifier_quoter;
        self.query_builder.sql.push_str("drop constraint ");
        self.query_builder
            .sql
            .push_str(&name.quote(quoter, AttemptedKeywordUsage::Other));

        self
    }

    fn start_new_action(&mut self) {
        if self.has_first_action {
            self.query_builder.sql.push_str(",\n    ")
        } else {
            self.query_builder.sql.push_str("\n    ");
            self.has_first_action = true;
        }
    }
}
