use tokio_postgres::Row;
use crate::postgres_client_wrapper::{FromRow, RowEnumExt};
use crate::ReferenceAction;
use super::define_table_query;

pub struct ForeignKeyResult {
    pub constraint_name: String,
    pub target_table_name: String,
    pub target_table_schema_name: String,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

impl FromRow for ForeignKeyResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            constraint_name: row.try_get(0)?,
            target_table_name: row.try_get(1)?,
            target_table_schema_name: row.try_get(2)?,
            update_action: row.try_get_enum_value(3)?,
            delete_action: row.try_get_enum_value(4)?,
        })
    }
}

//language=postgresql
define_table_query!(get_foreign_keys, ForeignKeyResult, r#"
select con.conname        as constraint_name,
       target.relname     as target_table_name,
       target_ns.nspname  as target_schema_name,
       con.confupdtype    as update_action,
       con.confdeltype    as delete_action
from pg_catalog.pg_constraint con
         join pg_catalog.pg_class tab on con.conrelid = tab.oid
         join pg_catalog.pg_namespace tab_ns on tab_ns.oid = tab.relnamespace
         join pg_catalog.pg_class target on con.confrelid = target.oid
         join pg_catalog.pg_namespace target_ns on target_ns.oid = target.relnamespace
where con.contype = 'f'
  and tab_ns.nspname = $1
  and tab.relname = $2
order by con.conname;
"#);
