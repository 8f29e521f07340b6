use cranedb_core::{QueryError, Rid, Value};
use cranedb_storage::{HashIndex, TableScan};

use crate::predicate::Predicate;

/// The runtime iterator tree a plan opens into. Pull-based: `before_first`
/// then repeated `next`, with the accessors valid only after a `true`.
///
/// Update operations reach the underlying table scan through any stack of
/// select scans; every other operator refuses them with `NotUpdatable`.
#[derive(Debug)]
pub enum Scan {
    Table(TableScan),
    Select(SelectScan),
    Project(ProjectScan),
    Product(ProductScan),
    IndexSelect(IndexSelectScan),
}

impl Scan {
    pub fn before_first(&mut self) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.before_first(),
            Scan::Select(s) => s.input.before_first(),
            Scan::Project(s) => s.input.before_first(),
            Scan::Product(s) => s.before_first(),
            Scan::IndexSelect(s) => s.before_first(),
        }
    }

    pub fn next(&mut self) -> Result<bool, QueryError> {
        match self {
            Scan::Table(s) => s.next(),
            Scan::Select(s) => s.next(),
            Scan::Project(s) => s.input.next(),
            Scan::Product(s) => s.next(),
            Scan::IndexSelect(s) => s.next(),
        }
    }

    pub fn get_int(&self, field: &str) -> Result<i32, QueryError> {
        match self {
            Scan::Table(s) => s.get_int(field),
            Scan::Select(s) => s.input.get_int(field),
            Scan::Project(s) => {
                s.check_projected(field)?;
                s.input.get_int(field)
            }
            Scan::Product(s) => s.side_for(field).get_int(field),
            Scan::IndexSelect(s) => s.table.get_int(field),
        }
    }

    pub fn get_string(&self, field: &str) -> Result<String, QueryError> {
        match self {
            Scan::Table(s) => s.get_string(field),
            Scan::Select(s) => s.input.get_string(field),
            Scan::Project(s) => {
                s.check_projected(field)?;
                s.input.get_string(field)
            }
            Scan::Product(s) => s.side_for(field).get_string(field),
            Scan::IndexSelect(s) => s.table.get_string(field),
        }
    }

    pub fn get_value(&self, field: &str) -> Result<Value, QueryError> {
        match self {
            Scan::Table(s) => s.get_value(field),
            Scan::Select(s) => s.input.get_value(field),
            Scan::Project(s) => {
                s.check_projected(field)?;
                s.input.get_value(field)
            }
            Scan::Product(s) => s.side_for(field).get_value(field),
            Scan::IndexSelect(s) => s.table.get_value(field),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        match self {
            Scan::Table(s) => s.has_field(field),
            Scan::Select(s) => s.input.has_field(field),
            Scan::Project(s) => s.fields.iter().any(|f| f == field),
            Scan::Product(s) => s.left.has_field(field) || s.right.has_field(field),
            Scan::IndexSelect(s) => s.table.has_field(field),
        }
    }

    /// Release every pin the scan tree holds. The tree is unusable
    /// afterwards.
    pub fn close(&mut self) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.close(),
            Scan::Select(s) => s.input.close(),
            Scan::Project(s) => s.input.close(),
            Scan::Product(s) => {
                s.left.close()?;
                s.right.close()
            }
            Scan::IndexSelect(s) => {
                s.index.close()?;
                s.table.close()
            }
        }
    }

    pub fn set_int(&self, field: &str, value: i32) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.set_int(field, value),
            Scan::Select(s) => s.input.set_int(field, value),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn set_string(&self, field: &str, value: &str) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.set_string(field, value),
            Scan::Select(s) => s.input.set_string(field, value),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn set_value(&self, field: &str, value: &Value) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.set_value(field, value),
            Scan::Select(s) => s.input.set_value(field, value),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn insert(&mut self) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.insert(),
            Scan::Select(s) => s.input.insert(),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn delete(&self) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.delete(),
            Scan::Select(s) => s.input.delete(),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn rid(&self) -> Result<Rid, QueryError> {
        match self {
            Scan::Table(s) => s.rid(),
            Scan::Select(s) => s.input.rid(),
            _ => Err(QueryError::NotUpdatable),
        }
    }

    pub fn move_to_rid(&mut self, rid: Rid) -> Result<(), QueryError> {
        match self {
            Scan::Table(s) => s.move_to_rid(rid),
            Scan::Select(s) => s.input.move_to_rid(rid),
            _ => Err(QueryError::NotUpdatable),
        }
    }
}

/// Passes through the rows of its input that satisfy a predicate.
#[derive(Debug)]
pub struct SelectScan {
    input: Box<Scan>,
    predicate: Predicate,
}

impl SelectScan {
    pub fn new(input: Scan, predicate: Predicate) -> Self {
        Self {
            input: Box::new(input),
            predicate,
        }
    }

    fn next(&mut self) -> Result<bool, QueryError> {
        while self.input.next()? {
            if self.predicate.is_satisfied(&self.input)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Restricts field access to the projected list.
#[derive(Debug)]
pub struct ProjectScan {
    input: Box<Scan>,
    fields: Vec<String>,
}

impl ProjectScan {
    pub fn new(input: Scan, fields: Vec<String>) -> Self {
        Self {
            input: Box::new(input),
            fields,
        }
    }

    fn check_projected(&self, field: &str) -> Result<(), QueryError> {
        if self.fields.iter().any(|f| f == field) {
            return Ok(());
        }

        Err(QueryError::UnknownField(field.to_string()))
    }
}

/// Every pairing of a left and a right row: the right input is rewound and
/// re-scanned for each left record. Construction advances the left input
/// to its first record; an empty left side yields no rows at all.
#[derive(Debug)]
pub struct ProductScan {
    left: Box<Scan>,
    right: Box<Scan>,
    left_has_row: bool,
}

impl ProductScan {
    pub fn new(mut left: Scan, right: Scan) -> Result<Self, QueryError> {
        let left_has_row = left.next()?;

        Ok(Self {
            left: Box::new(left),
            right: Box::new(right),
            left_has_row,
        })
    }

    fn before_first(&mut self) -> Result<(), QueryError> {
        self.left.before_first()?;
        self.left_has_row = self.left.next()?;
        self.right.before_first()
    }

    fn next(&mut self) -> Result<bool, QueryError> {
        if !self.left_has_row {
            return Ok(false);
        }

        loop {
            if self.right.next()? {
                return Ok(true);
            }

            self.right.before_first()?;
            if !self.left.next()? {
                self.left_has_row = false;
                return Ok(false);
            }
        }
    }

    fn side_for(&self, field: &str) -> &Scan {
        if self.left.has_field(field) {
            &self.left
        } else {
            &self.right
        }
    }
}

/// Walks the index entries matching one key and positions the table scan
/// on each hit's RID.
#[derive(Debug)]
pub struct IndexSelectScan {
    table: TableScan,
    index: HashIndex,
    value: Value,
}

impl IndexSelectScan {
    pub fn new(table: TableScan, index: HashIndex, value: Value) -> Result<Self, QueryError> {
        let mut scan = Self {
            table,
            index,
            value,
        };
        scan.before_first()?;

        Ok(scan)
    }

    fn before_first(&mut self) -> Result<(), QueryError> {
        self.index.before_first(self.value.clone())
    }

    fn next(&mut self) -> Result<bool, QueryError> {
        if !self.index.next()? {
            return Ok(false);
        }

        let rid = self.index.data_rid()?;
        self.table.move_to_rid(rid)?;

        Ok(true)
    }
}
