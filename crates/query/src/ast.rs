use std::fmt::Display;

use cranedb_core::{Schema, Value};
use itertools::Itertools as _;

use crate::predicate::{Expression, Predicate};

/// One parsed SQL statement.
#[derive(Debug, Clone)]
pub enum Statement {
    Query(QueryData),
    Insert(InsertData),
    Delete(DeleteData),
    Modify(ModifyData),
    CreateTable(CreateTableData),
    CreateView(CreateViewData),
    CreateIndex(CreateIndexData),
}

/// `SELECT fields FROM tables [WHERE predicate]`.
///
/// Displays back as valid SQL; view definitions are stored in the catalog
/// through this rendering.
#[derive(Debug, Clone)]
pub struct QueryData {
    pub fields: Vec<String>,
    pub tables: Vec<String>,
    pub predicate: Predicate,
}

impl Display for QueryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "select {} from {}",
            self.fields.iter().join(", "),
            self.tables.iter().join(", ")
        )?;

        if !self.predicate.is_empty() {
            write!(f, " where {}", self.predicate)?;
        }

        Ok(())
    }
}

/// `INSERT INTO table (fields) VALUES (values)`.
#[derive(Debug, Clone)]
pub struct InsertData {
    pub table: String,
    pub fields: Vec<String>,
    pub values: Vec<Value>,
}

/// `DELETE FROM table [WHERE predicate]`.
#[derive(Debug, Clone)]
pub struct DeleteData {
    pub table: String,
    pub predicate: Predicate,
}

/// `UPDATE table SET field = expression [WHERE predicate]`.
#[derive(Debug, Clone)]
pub struct ModifyData {
    pub table: String,
    pub field: String,
    pub value: Expression,
    pub predicate: Predicate,
}

/// `CREATE TABLE table (field defs)`.
#[derive(Debug, Clone)]
pub struct CreateTableData {
    pub table: String,
    pub schema: Schema,
}

/// `CREATE VIEW view AS query`.
#[derive(Debug, Clone)]
pub struct CreateViewData {
    pub view: String,
    pub query: QueryData,
}

impl CreateViewData {
    /// The SQL text persisted as the view definition.
    pub fn definition(&self) -> String {
        self.query.to_string()
    }
}

/// `CREATE INDEX index ON table (field)`.
#[derive(Debug, Clone)]
pub struct CreateIndexData {
    pub index: String,
    pub table: String,
    pub field: String,
}
