use tokio_postgres::Row;
use crate::postgres_client_wrapper::FromRow;
use super::define_table_query;

pub struct ForeignKeyColumnResult {
    pub constraint_name: String,
    pub source_table_column_name: String,
    pub target_table_column_name: String,
    pub position: i32,
}

impl FromRow for ForeignKeyColumnResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            constraint_name: row.try_get(0)?,
            source_table_column_name: row.try_get(1)?,
            target_table_column_name: row.try_get(2)?,
            position: row.try_get(3)?,
        })
    }
}

//language=postgresql
define_table_query!(get_foreign_key_columns, ForeignKeyColumnResult, r#"
select con.conname               as constraint_name,
       source_table_attr.attname as source_table_column_name,
       target_table_attr.attname as target_table_column_name,
       cols.position::int4       as position
from pg_catalog.pg_constraint con
         join pg_catalog.pg_class tab on con.conrelid = tab.oid
         join pg_catalog.pg_namespace tab_ns on tab_ns.oid = tab.relnamespace
         join unnest(con.conkey, con.confkey) with ordinality as cols (conkey, confkey, position) on true
         join pg_catalog.pg_attribute source_table_attr
              on source_table_attr.attrelid = con.conrelid and source_table_attr.attnum = cols.conkey
         join pg_catalog.pg_attribute target_table_attr
              on target_table_attr.attrelid = con.confrelid and target_table_attr.attnum = cols.confkey
where con.contype = 'f'
  and tab_ns.nspname = $1
  and tab.relname = $2
order by con.conname, cols.position;
"#);
