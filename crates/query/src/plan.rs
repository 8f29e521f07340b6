use std::sync::Arc;

use cranedb_core::{Layout, QueryError, Schema, Value};
use cranedb_storage::{TableScan, Transaction};

use crate::metadata::{IndexInfo, MetadataManager, StatInfo};
use crate::predicate::Predicate;
use crate::scan::{IndexSelectScan, ProductScan, ProjectScan, Scan, SelectScan};

/// The cost-bearing description of a query: a tree of relational operators
/// with cardinality estimates, opened into a scan tree for execution.
///
/// A closed family, so an enum with one variant per operator.
#[derive(Debug, Clone)]
pub enum Plan {
    Table(TablePlan),
    Select(SelectPlan),
    Project(ProjectPlan),
    Product(ProductPlan),
    IndexSelect(IndexSelectPlan),
}

impl Plan {
    pub fn schema(&self) -> &Schema {
        match self {
            Plan::Table(p) => p.schema(),
            Plan::Select(p) => p.input.schema(),
            Plan::Project(p) => &p.schema,
            Plan::Product(p) => &p.schema,
            Plan::IndexSelect(p) => p.table.schema(),
        }
    }

    /// Estimated block reads to produce the full output once.
    pub fn blocks_accessed(&self) -> i64 {
        match self {
            Plan::Table(p) => p.stats.blocks_accessed(),
            Plan::Select(p) => p.input.blocks_accessed(),
            Plan::Project(p) => p.input.blocks_accessed(),
            Plan::Product(p) => {
                p.left.blocks_accessed()
                    + p.left.records_output().saturating_mul(p.right.blocks_accessed())
            }
            Plan::IndexSelect(p) => p.info.blocks_accessed() + p.info.records_output(),
        }
    }

    /// Estimated number of output records.
    pub fn records_output(&self) -> i64 {
        match self {
            Plan::Table(p) => p.stats.records_output(),
            Plan::Select(p) => {
                p.input.records_output() / p.predicate.reduction_factor(&p.input)
            }
            Plan::Project(p) => p.input.records_output(),
            Plan::Product(p) => p.left.records_output().saturating_mul(p.right.records_output()),
            Plan::IndexSelect(p) => p.info.records_output(),
        }
    }

    /// Estimated distinct values of the field in the output.
    pub fn distinct_values(&self, field: &str) -> i64 {
        match self {
            Plan::Table(p) => p.stats.distinct_values(field),
            Plan::Select(p) => {
                if p.predicate.equates_with_constant(field).is_some() {
                    1
                } else if let Some(other) = p.predicate.equates_with_field(field) {
                    p.input
                        .distinct_values(field)
                        .min(p.input.distinct_values(other))
                } else {
                    p.input.distinct_values(field)
                }
            }
            Plan::Project(p) => p.input.distinct_values(field),
            Plan::Product(p) => {
                if p.left.schema().has_field(field) {
                    p.left.distinct_values(field)
                } else {
                    p.right.distinct_values(field)
                }
            }
            Plan::IndexSelect(p) => p.info.distinct_values(field),
        }
    }

    /// Materialize the scan tree this plan describes.
    pub fn open(&self) -> Result<Scan, QueryError> {
        match self {
            Plan::Table(p) => Ok(Scan::Table(p.open_table()?)),
            Plan::Select(p) => Ok(Scan::Select(SelectScan::new(
                p.input.open()?,
                p.predicate.clone(),
            ))),
            Plan::Project(p) => Ok(Scan::Project(ProjectScan::new(
                p.input.open()?,
                p.schema.fields().to_vec(),
            ))),
            Plan::Product(p) => Ok(Scan::Product(ProductScan::new(
                p.left.open()?,
                p.right.open()?,
            )?)),
            Plan::IndexSelect(p) => Ok(Scan::IndexSelect(IndexSelectScan::new(
                p.table.open_table()?,
                p.info.open(),
                p.value.clone(),
            )?)),
        }
    }
}

/// Leaf plan: a full scan of one table, costed from the stats cache.
#[derive(Debug, Clone)]
pub struct TablePlan {
    tx: Arc<Transaction>,
    table: String,
    layout: Layout,
    stats: StatInfo,
}

impl TablePlan {
    pub fn new(
        tx: Arc<Transaction>,
        table: &str,
        metadata: &MetadataManager,
    ) -> Result<Self, QueryError> {
        let layout = metadata.layout(table, &tx)?;
        let stats = metadata.stat_info(table, &layout, &tx)?;

        Ok(Self {
            tx,
            table: table.to_string(),
            layout,
            stats,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        self.layout.schema()
    }

    pub fn open_table(&self) -> Result<TableScan, QueryError> {
        TableScan::new(Arc::clone(&self.tx), &self.table, self.layout.clone())
    }
}

/// Filters its input by a predicate. Costs nothing extra in blocks; the
/// predicate's reduction factor shrinks the record estimate.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    input: Box<Plan>,
    predicate: Predicate,
}

impl SelectPlan {
    pub fn new(input: Plan, predicate: Predicate) -> Self {
        Self {
            input: Box::new(input),
            predicate,
        }
    }
}

/// Restricts its input to the named fields.
#[derive(Debug, Clone)]
pub struct ProjectPlan {
    input: Box<Plan>,
    schema: Schema,
}

impl ProjectPlan {
    pub fn new(input: Plan, fields: Vec<String>) -> Result<Self, QueryError> {
        let mut schema = Schema::new();
        for field in &fields {
            if !input.schema().has_field(field) {
                return Err(QueryError::UnknownField(field.clone()));
            }
            schema.add(field, input.schema());
        }

        Ok(Self {
            input: Box::new(input),
            schema,
        })
    }
}

/// Cartesian product. The right input is re-scanned once per left record,
/// which the block estimate reflects.
#[derive(Debug, Clone)]
pub struct ProductPlan {
    left: Box<Plan>,
    right: Box<Plan>,
    schema: Schema,
}

impl ProductPlan {
    pub fn new(left: Plan, right: Plan) -> Self {
        let mut schema = Schema::new();
        schema.add_all(left.schema());
        schema.add_all(right.schema());

        Self {
            left: Box::new(left),
            right: Box::new(right),
            schema,
        }
    }
}

/// Probes a hash index for one key and joins the hits back to the table by
/// RID.
#[derive(Debug, Clone)]
pub struct IndexSelectPlan {
    table: TablePlan,
    info: IndexInfo,
    value: Value,
}

impl IndexSelectPlan {
    pub fn new(table: TablePlan, info: IndexInfo, value: Value) -> Self {
        Self { table, info, value }
    }
}
