//! Table management commands

use crate::blob::BlobStore;
use crate::error::Result;
use crate::meta::{ImportRun, LeadTable, MetaDb};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Table with its latest import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    #[serde(flatten)]
    pub table: LeadTable,
    pub columns: Vec<String>,
    pub tags: Vec<String>,
    pub latest_run: Option<ImportRun>,
}

/// List tables, optionally for one owner
pub async fn cmd_list_tables(db: &MetaDb, owner: Option<&str>) -> Result<Vec<LeadTable>> {
    info!("Listing tables");
    db.list_tables(owner).await
}

/// Show one table
pub async fn cmd_show_table(db: &MetaDb, id_or_name: &str) -> Result<TableInfo> {
    let table = db.resolve_table(id_or_name).await?;
    let latest_run = db.get_latest_run(&table.id).await?;
    Ok(TableInfo {
        columns: table.columns(),
        tags: table.tags(),
        table,
        latest_run,
    })
}

/// Replace a table's tags
pub async fn cmd_tag_table(db: &MetaDb, id_or_name: &str, tags: Vec<String>) -> Result<LeadTable> {
    let table = db.resolve_table(id_or_name).await?;
    db.update_table_tags(&table.id, &tags).await?;
    db.resolve_table(&table.id).await
}

/// Remove a table's files and metadata. Leads already sold stay in the ledger.
pub async fn cmd_remove_table(
    db: &MetaDb,
    store: &dyn BlobStore,
    id_or_name: &str,
) -> Result<LeadTable> {
    let table = db.resolve_table(id_or_name).await?;
    info!(table = %table.id, "Removing table");

    for location in [
        &table.file_location,
        &table.duplicates_location,
        &table.db_duplicates_location,
    ]
    .into_iter()
    .flatten()
    {
        store.remove(location)?;
    }
    db.delete_table(&table.id).await?;
    Ok(table)
}

/// Print tables list to console
pub fn print_tables(tables: &[LeadTable]) {
    println!("\n📋 Lead Tables\n");

    if tables.is_empty() {
        println!("No tables yet. Use 'leadpipe import' to add one.");
        return;
    }

    for table in tables {
        println!("• {} [{}] owner: {}", table.name, table.status, table.owner);
        println!("  ID: {}", table.id);
        println!("  Rows: {}, Delimiter: {}", table.row_count, table.delimiter);
        let tags = table.tags();
        if !tags.is_empty() {
            println!("  Tags: {}", tags.join(", "));
        }
        println!();
    }
}

/// Print one table to console
pub fn print_table(info: &TableInfo) {
    let table = &info.table;
    println!("\n{} ({})", table.name, table.id);
    println!("  Owner: {}", table.owner);
    println!("  Status: {}", table.status);
    println!("  Rows: {}", table.row_count);
    println!("  Delimiter: {}", table.delimiter);
    println!("  Columns: {}", info.columns.join(", "));
    if !info.tags.is_empty() {
        println!("  Tags: {}", info.tags.join(", "));
    }
    if let Some(location) = &table.file_location {
        println!("  File: {}", location);
    }
    if let Some(run) = &info.latest_run {
        println!(
            "  Last import: {} at {} ({} unique of {} rows)",
            run.status, run.started_at, run.unique_rows, run.total_rows
        );
        if let Some(error) = &run.error {
            println!("  Error: {}", error);
        }
    }
}

/// Print table IDs with descriptions for shell completions
pub fn print_table_completions(tables: &[LeadTable], shell: Shell) {
    for table in tables {
        let description = format!("{} (owner {}, {} rows)", table.name, table.owner, table.row_count)
            .replace('\n', " ");

        match shell {
            Shell::Zsh => {
                println!("{}:{}", table.id, description.replace(':', "\\:"));
            }
            Shell::Fish => {
                println!("{}\t{}", table.id, description.replace('\t', " "));
            }
            _ => {
                println!("{}", table.id);
            }
        }
    }
}
