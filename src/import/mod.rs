//! Table import pipeline
//!
//! reader -> identifier assigner -> in-file dedup -> corpus dedup -> table
//!
//! Every stage pulls from the one before it, so memory is bounded by the key
//! sets, not the file. The table file and the two duplicate side files are
//! written through blob sinks and committed only after the whole source was
//! read; a failure anywhere leaves every target untouched.

use crate::blob::{BlobSink, BlobStore};
use crate::dedup::{
    CorpusIndex, DedupCounts, DedupMode, DivertDuplicatesExt, InFileDeduplicator, KeySpec,
};
use crate::error::Result;
use crate::ident::{header_with_lead_id, AssignLeadIdsExt};
use crate::reader::{open_rows, Delimiter, ReaderOptions, RowSink, RowWriter, SkipCounts};
use crate::table::TableSource;
use crate::warning::SourceWarning;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{debug, info};

const PROGRESS_EVERY: u64 = 4096;

/// Blob paths an import writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTargets {
    pub table: String,
    pub duplicates: String,
    pub database_duplicates: String,
}

impl ImportTargets {
    /// Conventional paths for a table id
    pub fn for_table(table_id: &str) -> Self {
        Self {
            table: format!("tables/{table_id}.csv"),
            duplicates: format!("tables/{table_id}.duplicates.csv"),
            database_duplicates: format!("tables/{table_id}.db_duplicates.csv"),
        }
    }
}

/// How to read and deduplicate the source
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub reader: ReaderOptions,
    /// Key columns for dedup; empty disables dedup
    pub key_columns: Vec<String>,
    pub mode: DedupMode,
    pub progress: Option<ProgressBar>,
}

impl ImportOptions {
    pub fn new(reader: ReaderOptions) -> Self {
        Self {
            reader,
            key_columns: Vec::new(),
            mode: DedupMode::File,
            progress: None,
        }
    }

    pub fn with_dedup(mut self, key_columns: Vec<String>, mode: DedupMode) -> Self {
        self.key_columns = key_columns;
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Summary of one import
///
/// `unique_rows + in_file_duplicates + database_duplicates + skipped.total()`
/// always equals `total_rows`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Physical data rows in the source, blank lines excluded
    pub total_rows: u64,
    pub skipped: SkipCounts,
    pub in_file_duplicates: u64,
    pub database_duplicates: u64,
    pub unique_rows: u64,
    /// Stored header, `lead_id` first
    pub columns: Vec<String>,
    pub delimiter: Option<Delimiter>,
    pub location: String,
    pub duplicates_location: Option<String>,
    pub database_duplicates_location: Option<String>,
    pub warnings: Vec<SourceWarning>,
}

impl ImportResult {
    /// Rows the reader dropped, whatever the reason
    pub fn parse_errors_skipped(&self) -> u64 {
        self.skipped.total()
    }
}

/// Side file created on first write and committed only if used
struct SideFile<'a> {
    store: &'a dyn BlobStore,
    path: String,
    delimiter: Delimiter,
    headers: &'a [String],
    writer: Option<RowWriter<Box<dyn BlobSink>>>,
}

impl<'a> SideFile<'a> {
    fn new(store: &'a dyn BlobStore, path: &str, delimiter: Delimiter, headers: &'a [String]) -> Self {
        Self {
            store,
            path: path.to_string(),
            delimiter,
            headers,
            writer: None,
        }
    }

    fn finish(self) -> Result<Option<String>> {
        match self.writer {
            Some(writer) => Ok(Some(writer.into_inner()?.commit()?)),
            None => {
                // Drop a side file left over from an earlier import of this table
                self.store.remove(&self.path)?;
                Ok(None)
            }
        }
    }
}

impl RowSink for SideFile<'_> {
    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            return writer.write_row(fields);
        }
        let sink = self.store.create(&self.path)?;
        let mut writer = RowWriter::new(sink, self.delimiter, self.headers)?;
        writer.write_row(fields)?;
        self.writer = Some(writer);
        Ok(())
    }
}

/// Run the import of `source` into `targets`.
///
/// `prior_tables` are the owner's other tables; they are only read when the
/// mode includes database dedup.
pub fn run_import<R: Read>(
    store: &dyn BlobStore,
    source: R,
    options: &ImportOptions,
    prior_tables: &[TableSource],
    targets: &ImportTargets,
) -> Result<ImportResult> {
    let mut rows = open_rows(source, options.reader)?;
    let delimiter = rows.delimiter();
    let header = header_with_lead_id(rows.headers());

    let key_spec = if options.key_columns.is_empty() {
        None
    } else {
        Some(KeySpec::resolve(&header, &options.key_columns, "import file")?)
    };

    let index = match &key_spec {
        Some(_) if options.mode.database() => CorpusIndex::build(
            store,
            prior_tables,
            &options.key_columns,
            options.reader.buffer_capacity,
        )?,
        _ => CorpusIndex::empty(),
    };

    let mut in_file = key_spec
        .clone()
        .filter(|_| options.mode.in_file())
        .map(InFileDeduplicator::new);
    let mut corpus = key_spec
        .filter(|_| options.mode.database() && !index.is_empty())
        .map(|spec| index.filter(spec));
    debug!(
        columns = header.len(),
        delimiter = %delimiter,
        in_file = in_file.is_some(),
        corpus_keys = index.len(),
        "Import pipeline ready"
    );

    let mut table = RowWriter::new(store.create(&targets.table)?, delimiter, &header)?;
    let mut duplicates = SideFile::new(store, &targets.duplicates, delimiter, &header);
    let mut db_duplicates = SideFile::new(store, &targets.database_duplicates, delimiter, &header);
    let mut file_counts = DedupCounts::default();
    let mut db_counts = DedupCounts::default();

    let stream = rows
        .by_ref()
        .assign_lead_ids()
        .divert_duplicates(&mut in_file, &mut duplicates, &mut file_counts)
        .divert_duplicates(&mut corpus, &mut db_duplicates, &mut db_counts);
    for row in stream {
        table.write_row(&row?.fields)?;
        if let Some(pb) = &options.progress {
            if table.rows() % PROGRESS_EVERY == 0 {
                pb.set_position(table.rows());
            }
        }
    }

    let result_rows = table.rows();
    let skipped = rows.skipped();
    let total_rows = rows.data_rows();
    debug_assert_eq!(
        total_rows,
        skipped.total() + file_counts.duplicates + db_counts.duplicates + result_rows
    );

    // The table goes first: if it cannot be committed, the side files of
    // the previous import must still match the previous table.
    let location = table.into_inner()?.commit()?;
    let duplicates_location = duplicates.finish()?;
    let database_duplicates_location = db_duplicates.finish()?;
    if let Some(pb) = &options.progress {
        pb.set_position(result_rows);
    }

    info!(
        total = total_rows,
        unique = result_rows,
        in_file_duplicates = file_counts.duplicates,
        database_duplicates = db_counts.duplicates,
        skipped = skipped.total(),
        "Import complete"
    );

    Ok(ImportResult {
        total_rows,
        skipped,
        in_file_duplicates: file_counts.duplicates,
        database_duplicates: db_counts.duplicates,
        unique_rows: result_rows,
        columns: header,
        delimiter: Some(delimiter),
        location,
        duplicates_location,
        database_duplicates_location,
        warnings: index.into_warnings(),
    })
}
