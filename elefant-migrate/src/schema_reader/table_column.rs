use tokio_postgres::Row;
use crate::postgres_client_wrapper::FromRow;
use crate::TableColumn;
use super::define_table_query;

#[derive(Debug, Eq, PartialEq)]
pub struct TableColumnsResult {
    pub column_name: String,
    pub ordinal_position: i16,
    pub is_nullable: bool,
    pub data_type: String,
    pub data_type_length: Option<i32>,
    pub charset: Option<String>,
    pub collation: Option<String>,
}

impl FromRow for TableColumnsResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(TableColumnsResult {
            column_name: row.try_get(0)?,
            ordinal_position: row.try_get(1)?,
            is_nullable: row.try_get(2)?,
            data_type: row.try_get(3)?,
            data_type_length: row.try_get(4)?,
            charset: row.try_get(5)?,
            collation: row.try_get(6)?,
        })
    }
}

impl TableColumnsResult {
    pub fn to_table_column(&self) -> TableColumn {
        TableColumn {
            name: self.column_name.clone(),
            ordinal_position: self.ordinal_position as i32,
            data_type: self.data_type.clone(),
            data_type_length: self.data_type_length,
            is_nullable: self.is_nullable,
            charset: self.charset.clone(),
            collation: self.collation.clone(),
        }
    }
}

// The collation is only reported when it differs from the type's default collation.
//language=postgresql
define_table_query!(get_columns, TableColumnsResult, r#"
select attr.attname,
       attr.attnum,
       attr.attnotnull = false                                               as is_nullable,
       t.typname,
       information_schema._pg_char_max_length(t.oid, attr.atttypmod)::int4 as data_type_length,
       case
           when t.typcategory = 'S' then pg_encoding_to_char(db.encoding)::text
           end                                                               as charset,
       case
           when attr.attcollation <> 0 and attr.attcollation <> t.typcollation then coll.collname::text
           end                                                               as collation
from pg_catalog.pg_attribute attr
         join pg_catalog.pg_class cl on attr.attrelid = cl.oid
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         join pg_catalog.pg_type t on attr.atttypid = t.oid
         join pg_catalog.pg_database db on db.datname = current_database()
         left join pg_catalog.pg_collation coll on coll.oid = attr.attcollation
where ns.nspname = $1
  and cl.relname = $2
  and attr.attnum > 0
  and not attr.attisdropped
order by attr.attnum;
"#);
