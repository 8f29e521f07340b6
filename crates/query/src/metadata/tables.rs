use std::collections::HashMap;
use std::sync::Arc;

use cranedb_core::{Layout, QueryError, Schema, SqlType, StorageError};
use cranedb_storage::{TableScan, Transaction};
use tracing::debug;

/// Maximum byte length of table, field, view, and index names.
pub const MAX_NAME: usize = 16;

pub const TABLE_CATALOG: &str = "table_catalog";
pub const FIELD_CATALOG: &str = "field_catalog";

/// Creates tables and reconstructs their layouts from the two core catalog
/// tables:
///
/// - `table_catalog(table_name, slot_size)` — one row per table;
/// - `field_catalog(table_name, field_name, type, length, offset)` — one
///   row per field, in declaration order.
///
/// On a new database the catalogs describe themselves: bootstrap creates
/// them through the same `create_table` path as user tables.
#[derive(Debug)]
pub struct TableManager {
    table_catalog_layout: Layout,
    field_catalog_layout: Layout,
}

impl TableManager {
    pub fn new(is_new: bool, tx: &Arc<Transaction>) -> Result<Self, QueryError> {
        let mut table_catalog = Schema::new();
        table_catalog.add_string_field("table_name", MAX_NAME);
        table_catalog.add_int_field("slot_size");

        let mut field_catalog = Schema::new();
        field_catalog.add_string_field("table_name", MAX_NAME);
        field_catalog.add_string_field("field_name", MAX_NAME);
        field_catalog.add_int_field("type");
        field_catalog.add_int_field("length");
        field_catalog.add_int_field("offset");

        let manager = Self {
            table_catalog_layout: Layout::new(table_catalog.clone()),
            field_catalog_layout: Layout::new(field_catalog.clone()),
        };

        if is_new {
            debug!("bootstrapping catalog tables");
            manager.create_table(TABLE_CATALOG, table_catalog, tx)?;
            manager.create_table(FIELD_CATALOG, field_catalog, tx)?;
        }

        Ok(manager)
    }

    /// Record the table and its fields in the catalogs.
    pub fn create_table(
        &self,
        name: &str,
        schema: Schema,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        let layout = Layout::new(schema);

        let mut tables = TableScan::new(
            Arc::clone(tx),
            TABLE_CATALOG,
            self.table_catalog_layout.clone(),
        )?;
        tables.insert()?;
        tables.set_string("table_name", name)?;
        tables.set_int("slot_size", layout.slot_size() as i32)?;
        tables.close()?;

        let mut fields = TableScan::new(
            Arc::clone(tx),
            FIELD_CATALOG,
            self.field_catalog_layout.clone(),
        )?;
        for field in layout.schema().fields() {
            let info = layout
                .schema()
                .info(field)
                .ok_or_else(|| StorageError::corrupt("schema field without info"))?;
            let offset = layout
                .offset(field)
                .ok_or_else(|| StorageError::corrupt("schema field without offset"))?;

            fields.insert()?;
            fields.set_string("table_name", name)?;
            fields.set_string("field_name", field)?;
            fields.set_int("type", info.sql_type.code())?;
            fields.set_int("length", info.length as i32)?;
            fields.set_int("offset", offset as i32)?;
        }
        fields.close()?;

        Ok(())
    }

    /// Rebuild the table's layout from the catalogs.
    pub fn layout(&self, name: &str, tx: &Arc<Transaction>) -> Result<Layout, QueryError> {
        let mut slot_size = None;

        let mut tables = TableScan::new(
            Arc::clone(tx),
            TABLE_CATALOG,
            self.table_catalog_layout.clone(),
        )?;
        while tables.next()? {
            if tables.get_string("table_name")? == name {
                slot_size = Some(tables.get_int("slot_size")? as usize);
                break;
            }
        }
        tables.close()?;

        let Some(slot_size) = slot_size else {
            return Err(QueryError::UnknownTable(name.to_string()));
        };

        let mut schema = Schema::new();
        let mut offsets = HashMap::new();

        let mut fields = TableScan::new(
            Arc::clone(tx),
            FIELD_CATALOG,
            self.field_catalog_layout.clone(),
        )?;
        while fields.next()? {
            if fields.get_string("table_name")? != name {
                continue;
            }

            let field_name = fields.get_string("field_name")?;
            let code = fields.get_int("type")?;
            let length = fields.get_int("length")? as usize;
            let offset = fields.get_int("offset")? as usize;

            let sql_type = SqlType::from_code(code).ok_or_else(|| {
                StorageError::corrupt(format!("field {field_name} has type code {code}"))
            })?;

            schema.add_field(&field_name, sql_type, length);
            offsets.insert(field_name, offset);
        }
        fields.close()?;

        Ok(Layout::from_catalog(schema, offsets, slot_size))
    }
}
