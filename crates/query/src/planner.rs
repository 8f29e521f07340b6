use std::sync::Arc;

use cranedb_core::{QueryError, Schema};
use cranedb_storage::Transaction;
use itertools::Itertools as _;
use tracing::debug;

use crate::ast::{
    CreateIndexData, CreateTableData, CreateViewData, DeleteData, InsertData, ModifyData,
    QueryData, Statement,
};
use crate::metadata::MetadataManager;
use crate::parse::Parser;
use crate::plan::{IndexSelectPlan, Plan, ProductPlan, ProjectPlan, SelectPlan, TablePlan};
use crate::predicate::Predicate;

/// Plans queries: one table plan per mentioned table (views expand to
/// their stored definition), index selection where a probe undercuts the
/// table scan, per-table predicate pushdown, join ordering by ascending
/// block cost with a directional choice at each step, a residual select
/// for the join terms, and a final projection.
#[derive(Debug)]
pub struct QueryPlanner {
    metadata: Arc<MetadataManager>,
}

impl QueryPlanner {
    pub fn new(metadata: Arc<MetadataManager>) -> Self {
        Self { metadata }
    }

    pub fn create_plan(
        &self,
        data: QueryData,
        tx: &Arc<Transaction>,
    ) -> Result<Plan, QueryError> {
        let mut plans = Vec::new();

        for table in &data.tables {
            if let Some(definition) = self.metadata.view_def(table, tx)? {
                debug!(view = %table, "expanding view");
                let view_query = Parser::new(&definition)?.query()?;

                let mut plan = self.create_plan(view_query, tx)?;
                if let Some(local) = data.predicate.select_sub_pred(plan.schema()) {
                    plan = Plan::Select(SelectPlan::new(plan, local));
                }
                plans.push(plan);
            } else {
                let table_plan = TablePlan::new(Arc::clone(tx), table, &self.metadata)?;
                plans.push(self.optimize_with_index(table_plan, &data.predicate, tx)?);
            }
        }

        let schemas: Vec<&Schema> = plans.iter().map(|p| p.schema()).collect();
        let residual = data.predicate.residual(&schemas);
        drop(schemas);

        let mut plan = self.optimize_join_order(plans);

        if !residual.is_empty() {
            plan = Plan::Select(SelectPlan::new(plan, residual));
        }

        Ok(Plan::Project(ProjectPlan::new(plan, data.fields)?))
    }

    /// Use an index probe for the table when some local term equates an
    /// indexed field with a constant and the probe's block estimate beats
    /// the table scan's; any remaining local terms wrap the result.
    fn optimize_with_index(
        &self,
        table_plan: TablePlan,
        predicate: &Predicate,
        tx: &Arc<Transaction>,
    ) -> Result<Plan, QueryError> {
        let Some(local) = predicate.select_sub_pred(table_plan.schema()) else {
            return Ok(Plan::Table(table_plan));
        };

        let indexes = self.metadata.index_info(table_plan.table_name(), tx)?;
        let table_blocks = Plan::Table(table_plan.clone()).blocks_accessed();

        for (field, info) in indexes {
            let Some((value, rest)) = local.split_equates_with_constant(&field) else {
                continue;
            };

            let index_plan = Plan::IndexSelect(IndexSelectPlan::new(
                table_plan.clone(),
                info,
                value,
            ));

            if index_plan.blocks_accessed() < table_blocks {
                debug!(
                    table = table_plan.table_name(),
                    field = %field,
                    index_blocks = index_plan.blocks_accessed(),
                    table_blocks,
                    "probing index instead of scanning"
                );

                if rest.is_empty() {
                    return Ok(index_plan);
                }
                return Ok(Plan::Select(SelectPlan::new(index_plan, rest)));
            }
        }

        Ok(Plan::Select(SelectPlan::new(Plan::Table(table_plan), local)))
    }

    /// Left-deep join tree over the plans sorted by ascending block cost,
    /// choosing the cheaper product direction at every step.
    fn optimize_join_order(&self, plans: Vec<Plan>) -> Plan {
        let mut ordered = plans
            .into_iter()
            .sorted_by_key(|p| p.blocks_accessed())
            .collect_vec();

        let mut plan = ordered.remove(0);
        for next in ordered {
            let forward = Plan::Product(ProductPlan::new(plan.clone(), next.clone()));
            let backward = Plan::Product(ProductPlan::new(next, plan));

            plan = if forward.blocks_accessed() <= backward.blocks_accessed() {
                forward
            } else {
                backward
            };
        }

        plan
    }
}

/// Executes update statements directly against scans. Indexes are
/// maintained on insert only; delete and modify leave existing entries
/// behind.
#[derive(Debug)]
pub struct UpdatePlanner {
    metadata: Arc<MetadataManager>,
}

impl UpdatePlanner {
    pub fn new(metadata: Arc<MetadataManager>) -> Self {
        Self { metadata }
    }

    pub fn execute_insert(
        &self,
        data: InsertData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        if data.fields.len() != data.values.len() {
            return Err(QueryError::bad_syntax(format!(
                "{} fields but {} values",
                data.fields.len(),
                data.values.len()
            )));
        }

        let plan = TablePlan::new(Arc::clone(tx), &data.table, &self.metadata)?;
        let mut indexes = self.metadata.index_info(&data.table, tx)?;

        let mut scan = Plan::Table(plan).open()?;
        scan.insert()?;
        let rid = scan.rid()?;

        for (field, value) in data.fields.iter().zip(&data.values) {
            scan.set_value(field, value)?;

            if let Some(info) = indexes.get_mut(field) {
                let mut index = info.open();
                index.insert(value.clone(), rid)?;
                index.close()?;
            }
        }
        scan.close()?;

        Ok(1)
    }

    pub fn execute_delete(
        &self,
        data: DeleteData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        let table = TablePlan::new(Arc::clone(tx), &data.table, &self.metadata)?;
        let plan = Plan::Select(SelectPlan::new(Plan::Table(table), data.predicate));

        let mut scan = plan.open()?;
        let mut affected = 0;
        while scan.next()? {
            scan.delete()?;
            affected += 1;
        }
        scan.close()?;

        Ok(affected)
    }

    pub fn execute_modify(
        &self,
        data: ModifyData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        let table = TablePlan::new(Arc::clone(tx), &data.table, &self.metadata)?;
        let plan = Plan::Select(SelectPlan::new(Plan::Table(table), data.predicate));

        let mut scan = plan.open()?;
        let mut affected = 0;
        while scan.next()? {
            let value = data.value.evaluate(&scan)?;
            scan.set_value(&data.field, &value)?;
            affected += 1;
        }
        scan.close()?;

        Ok(affected)
    }

    pub fn execute_create_table(
        &self,
        data: CreateTableData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        self.metadata.create_table(&data.table, data.schema, tx)?;
        Ok(0)
    }

    pub fn execute_create_view(
        &self,
        data: CreateViewData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        self.metadata
            .create_view(&data.view, &data.definition(), tx)?;
        Ok(0)
    }

    pub fn execute_create_index(
        &self,
        data: CreateIndexData,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        self.metadata
            .create_index(&data.index, &data.table, &data.field, tx)?;
        Ok(0)
    }
}

/// Entry point for sessions: parse SQL, then route queries to the query
/// planner and everything else to the update planner.
#[derive(Debug)]
pub struct Planner {
    query_planner: QueryPlanner,
    update_planner: UpdatePlanner,
}

impl Planner {
    pub fn new(metadata: Arc<MetadataManager>) -> Self {
        Self {
            query_planner: QueryPlanner::new(Arc::clone(&metadata)),
            update_planner: UpdatePlanner::new(metadata),
        }
    }

    /// Plan a SELECT statement.
    pub fn create_query_plan(
        &self,
        sql: &str,
        tx: &Arc<Transaction>,
    ) -> Result<Plan, QueryError> {
        match Parser::new(sql)?.statement()? {
            Statement::Query(data) => self.plan_query(data, tx),
            _ => Err(QueryError::bad_syntax("expected a query")),
        }
    }

    pub fn plan_query(&self, data: QueryData, tx: &Arc<Transaction>) -> Result<Plan, QueryError> {
        self.query_planner.create_plan(data, tx)
    }

    /// Execute an update statement, returning the affected-record count.
    pub fn execute_update(&self, sql: &str, tx: &Arc<Transaction>) -> Result<usize, QueryError> {
        let statement = Parser::new(sql)?.statement()?;
        self.execute_statement(statement, tx)
    }

    pub fn execute_statement(
        &self,
        statement: Statement,
        tx: &Arc<Transaction>,
    ) -> Result<usize, QueryError> {
        match statement {
            Statement::Query(_) => Err(QueryError::bad_syntax("expected an update command")),
            Statement::Insert(data) => self.update_planner.execute_insert(data, tx),
            Statement::Delete(data) => self.update_planner.execute_delete(data, tx),
            Statement::Modify(data) => self.update_planner.execute_modify(data, tx),
            Statement::CreateTable(data) => self.update_planner.execute_create_table(data, tx),
            Statement::CreateView(data) => self.update_planner.execute_create_view(data, tx),
            Statement::CreateIndex(data) => self.update_planner.execute_create_index(data, tx),
        }
    }
}
