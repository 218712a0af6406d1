//! Logical-to-physical column mapping of a collection

use crate::table::TableSource;
use std::collections::HashMap;

/// Everything the extractor needs to know about a collection
#[derive(Debug, Clone, Default)]
pub struct CollectionLayout {
    pub id: String,
    /// Logical columns in output order
    pub columns: Vec<String>,
    /// Source tables in scan order
    pub tables: Vec<TableSource>,
    /// logical column -> table id -> physical column
    mappings: HashMap<String, HashMap<String, String>>,
}

impl CollectionLayout {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: TableSource) -> Self {
        self.tables.push(table);
        self
    }

    /// Map `logical` onto `physical` in `table_id`
    pub fn map_column(&mut self, logical: &str, table_id: &str, physical: &str) {
        let logical = logical.trim().to_string();
        if !self.columns.iter().any(|c| c.eq_ignore_ascii_case(&logical)) {
            self.columns.push(logical.clone());
        }
        let key = self.canonical(&logical).unwrap_or(logical);
        self.mappings
            .entry(key)
            .or_default()
            .insert(table_id.to_string(), physical.trim().to_string());
    }

    pub fn with_mapping(mut self, logical: &str, table_id: &str, physical: &str) -> Self {
        self.map_column(logical, table_id, physical);
        self
    }

    /// Physical column backing `logical` in `table_id`
    pub fn physical(&self, logical: &str, table_id: &str) -> Option<&str> {
        let key = self.canonical(logical)?;
        self.mappings
            .get(&key)
            .and_then(|by_table| by_table.get(table_id))
            .map(String::as_str)
    }

    pub fn has_column(&self, logical: &str) -> bool {
        self.canonical(logical).is_some()
    }

    fn canonical(&self, logical: &str) -> Option<String> {
        let wanted = logical.trim();
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(wanted))
            .cloned()
    }
}
