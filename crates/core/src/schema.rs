use std::collections::HashMap;
use std::sync::Arc;

/// The two column types the engine supports. The integer codes are the ones
/// persisted in `field_catalog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Int,
    Varchar,
}

impl SqlType {
    pub fn code(&self) -> i32 {
        match self {
            SqlType::Int => 0,
            SqlType::Varchar => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SqlType::Int),
            1 => Some(SqlType::Varchar),
            _ => None,
        }
    }
}

/// Type plus declared length of one field. Length is 4 for ints and the
/// maximum byte length for varchars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub sql_type: SqlType,
    pub length: usize,
}

impl FieldInfo {
    /// Bytes the field occupies inside a slot. Strings reserve their
    /// declared maximum plus the u32 length prefix.
    pub fn byte_size(&self) -> usize {
        match self.sql_type {
            SqlType::Int => 4,
            SqlType::Varchar => 4 + self.length,
        }
    }
}

/// An ordered list of field names with their type information. Field order
/// is declaration order and field names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<String>,
    info: HashMap<String, FieldInfo>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, name: &str, sql_type: SqlType, length: usize) {
        if self.info.contains_key(name) {
            return;
        }

        self.fields.push(name.to_string());
        self.info.insert(name.to_string(), FieldInfo { sql_type, length });
    }

    pub fn add_int_field(&mut self, name: &str) {
        self.add_field(name, SqlType::Int, 4);
    }

    pub fn add_string_field(&mut self, name: &str, length: usize) {
        self.add_field(name, SqlType::Varchar, length);
    }

    /// Copy one field definition from another schema.
    pub fn add(&mut self, name: &str, other: &Schema) {
        if let Some(info) = other.info(name) {
            self.add_field(name, info.sql_type, info.length);
        }
    }

    /// Copy every field definition from another schema, preserving order.
    pub fn add_all(&mut self, other: &Schema) {
        for field in other.fields() {
            self.add(field, other);
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Option<FieldInfo> {
        self.info.get(name).copied()
    }

    pub fn sql_type(&self, name: &str) -> Option<SqlType> {
        self.info(name).map(|i| i.sql_type)
    }

    pub fn length(&self, name: &str) -> Option<usize> {
        self.info(name).map(|i| i.length)
    }
}

/// Physical description of a record slot: per-field byte offsets plus the
/// total slot size. The first four bytes of every slot hold its status cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    schema: Arc<Schema>,
    offsets: HashMap<String, usize>,
    slot_size: usize,
}

/// Bytes reserved at the start of each slot for the in-use flag.
pub const SLOT_HEADER_SIZE: usize = 4;

impl Layout {
    /// Derive offsets for a fresh schema: fields packed in declaration
    /// order right after the slot header.
    pub fn new(schema: Schema) -> Self {
        let mut offsets = HashMap::new();
        let mut pos = SLOT_HEADER_SIZE;

        for field in schema.fields() {
            offsets.insert(field.clone(), pos);
            pos += schema.info(field).map(|i| i.byte_size()).unwrap_or(0);
        }

        Self {
            schema: Arc::new(schema),
            offsets,
            slot_size: pos,
        }
    }

    /// Rebuild a layout from offsets already persisted in the catalog.
    pub fn from_catalog(
        schema: Schema,
        offsets: HashMap<String, usize>,
        slot_size: usize,
    ) -> Self {
        Self {
            schema: Arc::new(schema),
            offsets,
            slot_size,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn offset(&self, field: &str) -> Option<usize> {
        self.offsets.get(field).copied()
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }
}
