use std::sync::Arc;

use cranedb_core::{Layout, QueryError, Schema};
use cranedb_storage::{TableScan, Transaction};

use super::tables::{TableManager, MAX_NAME};

/// Maximum byte length of a stored view definition.
pub const MAX_VIEW: usize = 100;

pub const VIEW_CATALOG: &str = "view_catalog";

/// Stores view definitions as SQL text in `view_catalog(view_name,
/// definition)`. The planner re-parses the definition whenever the view is
/// queried.
#[derive(Debug)]
pub struct ViewManager {
    catalog_layout: Layout,
}

impl ViewManager {
    pub fn new(
        is_new: bool,
        tables: &TableManager,
        tx: &Arc<Transaction>,
    ) -> Result<Self, QueryError> {
        let mut schema = Schema::new();
        schema.add_string_field("view_name", MAX_NAME);
        schema.add_string_field("definition", MAX_VIEW);

        if is_new {
            tables.create_table(VIEW_CATALOG, schema.clone(), tx)?;
        }

        Ok(Self {
            catalog_layout: Layout::new(schema),
        })
    }

    pub fn create_view(
        &self,
        name: &str,
        definition: &str,
        tx: &Arc<Transaction>,
    ) -> Result<(), QueryError> {
        let mut scan = TableScan::new(Arc::clone(tx), VIEW_CATALOG, self.catalog_layout.clone())?;

        scan.insert()?;
        scan.set_string("view_name", name)?;
        scan.set_string("definition", definition)?;
        scan.close()?;

        Ok(())
    }

    pub fn view_def(
        &self,
        name: &str,
        tx: &Arc<Transaction>,
    ) -> Result<Option<String>, QueryError> {
        let mut scan = TableScan::new(Arc::clone(tx), VIEW_CATALOG, self.catalog_layout.clone())?;

        let mut definition = None;
        while scan.next()? {
            if scan.get_string("view_name")? == name {
                definition = Some(scan.get_string("definition")?);
                break;
            }
        }
        scan.close()?;

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranedb_testing::test_tx;

    #[test]
    fn definitions_round_trip() {
        let (_db, tx) = test_tx();
        let tables = TableManager::new(true, &tx).unwrap();
        let views = ViewManager::new(true, &tables, &tx).unwrap();

        views
            .create_view("adults", "select name from students where age = 21", &tx)
            .unwrap();

        assert_eq!(
            views.view_def("adults", &tx).unwrap().as_deref(),
            Some("select name from students where age = 21")
        );
        assert_eq!(views.view_def("minors", &tx).unwrap(), None);

        tx.commit().unwrap();
    }

    #[test]
    fn overlong_definitions_are_rejected() {
        let (_db, tx) = test_tx();
        let tables = TableManager::new(true, &tx).unwrap();
        let views = ViewManager::new(true, &tables, &tx).unwrap();

        let definition = format!("select a from t where a = '{}'", "x".repeat(MAX_VIEW));
        let err = views.create_view("big", &definition, &tx).unwrap_err();

        assert!(matches!(err, QueryError::ValueTooLong(_)));
        tx.rollback().unwrap();
    }
}
