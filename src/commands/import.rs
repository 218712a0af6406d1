//! Import command implementation

use crate::blob::BlobStore;
use crate::config::Config;
use crate::dedup::DedupMode;
use crate::error::{Error, Result};
use crate::import::{run_import, ImportOptions, ImportResult, ImportTargets};
use crate::meta::{LeadTable, MetaDb};
use crate::progress::{finish_row_spinner, start_row_spinner};
use crate::reader::{DelimiterChoice, RaggedRows, ReaderOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// What to import and how
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub owner: String,
    /// Table name, unique per owner. Importing under an existing name replaces that table's file.
    pub name: String,
    /// Local file to read. This is a filesystem path, not a blob location:
    /// only the imported table and its side files go through the blob store.
    pub source: PathBuf,
    pub delimiter: Option<DelimiterChoice>,
    pub ragged_rows: Option<RaggedRows>,
    pub key_columns: Vec<String>,
    pub mode: Option<DedupMode>,
    pub tags: Vec<String>,
}

impl ImportRequest {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            source: source.into(),
            delimiter: None,
            ragged_rows: None,
            key_columns: Vec::new(),
            mode: None,
            tags: Vec::new(),
        }
    }
}

/// Result of an import, with the table it landed in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub table_id: String,
    pub table_name: String,
    pub owner: String,
    pub run_id: String,
    pub result: ImportResult,
}

/// Import a delimited file as a lead table.
///
/// `request.source` is opened from the local filesystem; everything written
/// goes to `store`.
pub async fn cmd_import(
    config: &Config,
    db: &MetaDb,
    store: Arc<dyn BlobStore>,
    request: ImportRequest,
    show_progress: bool,
) -> Result<ImportOutcome> {
    let source = std::fs::File::open(&request.source)?;

    let (table, fresh) = match db.get_table_by_name(&request.owner, &request.name).await? {
        Some(existing) => (existing, false),
        None => {
            let table = LeadTable::new(
                request.owner.clone(),
                request.name.clone(),
                request.tags.clone(),
            );
            db.insert_table(&table).await?;
            (table, true)
        }
    };

    let mode = request.mode.unwrap_or(config.import.default_dedup_mode);
    let reader = ReaderOptions::new(
        request.delimiter.unwrap_or(config.import.default_delimiter),
        request.ragged_rows.unwrap_or(config.import.ragged_rows),
    )
    .with_buffer_capacity(config.import.buffer_capacity);

    let prior_tables = if mode.database() && !request.key_columns.is_empty() {
        db.owner_table_sources(&request.owner, &table.id).await?
    } else {
        Vec::new()
    };

    info!(
        table = %table.name,
        owner = %table.owner,
        mode = %mode,
        keys = request.key_columns.len(),
        prior_tables = prior_tables.len(),
        "Importing {:?}",
        request.source
    );

    let run = db.start_import_run(&table.id).await?;

    let progress = show_progress.then(|| start_row_spinner(&format!("importing {}", table.name)));
    let mut options = ImportOptions::new(reader).with_dedup(request.key_columns.clone(), mode);
    if let Some(pb) = &progress {
        options = options.with_progress(pb.clone());
    }
    let targets = ImportTargets::for_table(&table.id);

    let outcome = tokio::task::spawn_blocking(move || {
        run_import(&*store, source, &options, &prior_tables, &targets)
    })
    .await
    .map_err(Error::from)
    .and_then(|r| r);

    let result = match outcome {
        Ok(result) => {
            finish_row_spinner(progress, "done");
            result
        }
        Err(e) => {
            finish_row_spinner(progress, "failed");
            warn!(table = %table.name, "Import failed: {}", e);
            db.fail_import_run(&run.id, &e.to_string()).await?;
            if fresh {
                db.discard_pending_table(&table.id).await?;
            }
            return Err(e);
        }
    };

    for warning in &result.warnings {
        warn!("{}", warning);
    }

    db.complete_table_import(&table.id, &result).await?;
    db.complete_import_run(&run.id, &result).await?;
    if !fresh && !request.tags.is_empty() {
        db.update_table_tags(&table.id, &request.tags).await?;
    }

    Ok(ImportOutcome {
        table_id: table.id,
        table_name: table.name,
        owner: table.owner,
        run_id: run.id,
        result,
    })
}

/// Print import summary to console
pub fn print_import_outcome(outcome: &ImportOutcome) {
    let r = &outcome.result;
    println!("\n✓ Imported '{}' ({})", outcome.table_name, outcome.table_id);
    println!("  Rows read: {}", r.total_rows);
    println!(
        "  Skipped: {} (malformed {}, ragged {})",
        r.skipped.total(),
        r.skipped.malformed,
        r.skipped.ragged
    );
    println!("  In-file duplicates: {}", r.in_file_duplicates);
    println!("  Database duplicates: {}", r.database_duplicates);
    println!("  Unique rows: {}", r.unique_rows);
    println!("  Table file: {}", r.location);
    if let Some(location) = &r.duplicates_location {
        println!("  Duplicates file: {}", location);
    }
    if let Some(location) = &r.database_duplicates_location {
        println!("  Database duplicates file: {}", location);
    }
    for warning in &r.warnings {
        println!("  ⚠ {}", warning);
    }
}
