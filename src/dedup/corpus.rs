//! Key index over an owner's previously imported tables

use super::{Deduplicator, KeySet, KeySpec};
use crate::blob::BlobStore;
use crate::error::Result;
use crate::reader::{open_rows, RaggedRows, ReaderOptions};
use crate::table::TableSource;
use crate::warning::SourceWarning;
use tracing::{debug, info, warn};

/// Set of normalized keys found in prior tables.
///
/// Built once per import and read-only afterwards. Tables that cannot be
/// opened or lack a key column are left out and reported as warnings.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    keys: KeySet,
    tables_indexed: usize,
    rows_indexed: u64,
    warnings: Vec<SourceWarning>,
}

impl CorpusIndex {
    /// Index with no prior tables
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(
        store: &dyn BlobStore,
        tables: &[TableSource],
        key_columns: &[String],
        buffer_capacity: usize,
    ) -> Result<Self> {
        let mut index = Self::empty();
        if tables.is_empty() {
            debug!("No prior tables, skipping corpus index");
            return Ok(index);
        }

        for table in tables {
            if let Err(reason) = index.add_table(store, table, key_columns, buffer_capacity) {
                warn!(table = %table.id, error = %reason, "Leaving table out of corpus index");
                index
                    .warnings
                    .push(SourceWarning::new(&table.id, &table.location, reason));
            }
        }

        info!(
            tables = index.tables_indexed,
            rows = index.rows_indexed,
            keys = index.keys.len(),
            skipped = index.warnings.len(),
            "Corpus index built"
        );
        Ok(index)
    }

    fn add_table(
        &mut self,
        store: &dyn BlobStore,
        table: &TableSource,
        key_columns: &[String],
        buffer_capacity: usize,
    ) -> Result<()> {
        let source = store.open(&table.location)?;
        let options = ReaderOptions::new(table.delimiter, RaggedRows::Pad)
            .with_buffer_capacity(buffer_capacity);
        let rows = open_rows(source, options)?;
        let spec = KeySpec::resolve(rows.headers(), key_columns, &format!("table {}", table.id))?;

        // Keys collected before a mid-stream failure stay in the index
        for row in rows {
            let row = row?;
            self.rows_indexed += 1;
            if let Some(key) = spec.key(&row.fields) {
                self.keys.insert(key);
            }
        }
        self.tables_indexed += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn tables_indexed(&self) -> usize {
        self.tables_indexed
    }

    pub fn warnings(&self) -> &[SourceWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<SourceWarning> {
        self.warnings
    }

    /// Filter that checks rows of a new file against this index
    pub fn filter(&self, spec: KeySpec) -> CorpusFilter<'_> {
        CorpusFilter { index: self, spec }
    }
}

/// Flags rows whose key already exists in the corpus
#[derive(Debug)]
pub struct CorpusFilter<'a> {
    index: &'a CorpusIndex,
    spec: KeySpec,
}

impl Deduplicator for CorpusFilter<'_> {
    fn is_duplicate(&mut self, fields: &[String]) -> bool {
        match self.spec.key(fields) {
            Some(key) => self.index.keys.contains(&key),
            None => false,
        }
    }
}
