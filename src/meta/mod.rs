//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Lead tables (registered imports and their file locations)
//! - Collections (logical columns mapped onto tables)
//! - Purchased leads (the ledger behind at-most-once resale)
//! - Import runs and orders (history and stats)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::CollectionLayout;
use crate::ident::LeadId;
use crate::import::ImportResult;
use crate::reader::Delimiter;
use crate::table::TableSource;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Lead table lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    /// Registered, first import not finished
    Pending,
    Ready,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Pending => write!(f, "pending"),
            TableStatus::Ready => write!(f, "ready"),
        }
    }
}

impl FromStr for TableStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TableStatus::Pending),
            "ready" => Ok(TableStatus::Ready),
            _ => Err(Error::Config(format!("Unknown table status: {}", s))),
        }
    }
}

/// Import run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// A registered lead table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeadTable {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub columns_json: String,
    pub delimiter: String,
    pub row_count: i64,
    pub tags_json: String,
    pub file_location: Option<String>,
    pub duplicates_location: Option<String>,
    pub db_duplicates_location: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl LeadTable {
    pub fn new(owner: String, name: String, tags: Vec<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            owner,
            columns_json: "[]".to_string(),
            delimiter: Delimiter::Comma.to_string(),
            row_count: 0,
            tags_json: serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()),
            file_location: None,
            duplicates_location: None,
            db_duplicates_location: None,
            status: TableStatus::Pending.to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn columns(&self) -> Vec<String> {
        serde_json::from_str(&self.columns_json).unwrap_or_default()
    }

    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags_json).unwrap_or_default()
    }

    pub fn get_status(&self) -> Result<TableStatus> {
        self.status.parse()
    }

    pub fn get_delimiter(&self) -> Result<Delimiter> {
        self.delimiter.parse()
    }

    /// Where the pipeline can read this table, if it has a file yet
    pub fn source(&self) -> Result<Option<TableSource>> {
        if self.get_status()? != TableStatus::Ready {
            return Ok(None);
        }
        match &self.file_location {
            Some(location) => Ok(Some(TableSource::new(
                &self.id,
                location,
                self.get_delimiter()?,
            ))),
            None => Ok(None),
        }
    }
}

/// A buyer-facing collection
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Collection {
    pub fn new(owner: String, name: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            owner,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One logical-to-physical column mapping
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub logical: String,
    pub table_id: String,
    pub physical: String,
}

/// An import run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: String,
    pub table_id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub total_rows: i64,
    pub skipped_malformed: i64,
    pub skipped_ragged: i64,
    pub in_file_duplicates: i64,
    pub database_duplicates: i64,
    pub unique_rows: i64,
    pub warnings_json: Option<String>,
    pub error: Option<String>,
}

impl ImportRun {
    pub fn new(table_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            table_id,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            total_rows: 0,
            skipped_malformed: 0,
            skipped_ragged: 0,
            in_file_duplicates: 0,
            database_duplicates: 0,
            unique_rows: 0,
            warnings_json: None,
            error: None,
        }
    }
}

/// A completed order
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub buyer: String,
    pub collection_id: String,
    pub budget: i64,
    pub matched: i64,
    pub file_location: String,
    pub filters_json: String,
    pub created_at: String,
}

impl Order {
    /// New order; the output file is named after the order id
    pub fn new(buyer: String, collection_id: String, budget: usize, filters_json: String) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            file_location: format!("orders/{}.csv", id),
            id,
            buyer,
            collection_id,
            budget: budget as i64,
            matched: 0,
            filters_json,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub table_count: usize,
    pub row_count: u64,
    pub collection_count: usize,
    pub order_count: usize,
    pub purchase_count: u64,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Create database with path directly (without full config)
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='lead_tables'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Lead Table Operations =====

    /// Register a new table
    pub async fn insert_table(&self, table: &LeadTable) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lead_tables (id, name, owner, columns_json, delimiter, row_count, tags_json,
                file_location, duplicates_location, db_duplicates_location, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&table.id)
        .bind(&table.name)
        .bind(&table.owner)
        .bind(&table.columns_json)
        .bind(&table.delimiter)
        .bind(table.row_count)
        .bind(&table.tags_json)
        .bind(&table.file_location)
        .bind(&table.duplicates_location)
        .bind(&table.db_duplicates_location)
        .bind(&table.status)
        .bind(&table.created_at)
        .bind(&table.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get table by ID
    pub async fn get_table(&self, id: &str) -> Result<Option<LeadTable>> {
        let table = sqlx::query_as::<_, LeadTable>("SELECT * FROM lead_tables WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(table)
    }

    /// Get table by owner and name
    pub async fn get_table_by_name(&self, owner: &str, name: &str) -> Result<Option<LeadTable>> {
        let table = sqlx::query_as::<_, LeadTable>(
            "SELECT * FROM lead_tables WHERE owner = ? AND name = ?",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(table)
    }

    /// Resolve a table by ID, or by name when the name is unique
    pub async fn resolve_table(&self, id_or_name: &str) -> Result<LeadTable> {
        if let Some(table) = self.get_table(id_or_name).await? {
            return Ok(table);
        }
        let mut matches = sqlx::query_as::<_, LeadTable>("SELECT * FROM lead_tables WHERE name = ?")
            .bind(id_or_name)
            .fetch_all(&self.pool)
            .await?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(Error::TableNotFound(id_or_name.to_string())),
            n => Err(Error::Other(format!(
                "{} tables are named '{}'; use the table ID",
                n, id_or_name
            ))),
        }
    }

    /// List tables, optionally for one owner
    pub async fn list_tables(&self, owner: Option<&str>) -> Result<Vec<LeadTable>> {
        let tables = match owner {
            Some(owner) => {
                sqlx::query_as::<_, LeadTable>(
                    "SELECT * FROM lead_tables WHERE owner = ? ORDER BY created_at, id",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LeadTable>("SELECT * FROM lead_tables ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(tables)
    }

    /// Readable tables of `owner`, except `exclude_id`
    pub async fn owner_table_sources(
        &self,
        owner: &str,
        exclude_id: &str,
    ) -> Result<Vec<TableSource>> {
        let mut sources = Vec::new();
        for table in self.list_tables(Some(owner)).await? {
            if table.id == exclude_id {
                continue;
            }
            if let Some(source) = table.source()? {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    /// Record the outcome of a successful import on the table row
    pub async fn complete_table_import(&self, id: &str, result: &ImportResult) -> Result<()> {
        let delimiter = result.delimiter.unwrap_or(Delimiter::Comma);
        sqlx::query(
            r#"
            UPDATE lead_tables SET
                columns_json = ?,
                delimiter = ?,
                row_count = ?,
                file_location = ?,
                duplicates_location = ?,
                db_duplicates_location = ?,
                status = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(&result.columns)?)
        .bind(delimiter.to_string())
        .bind(result.unique_rows as i64)
        .bind(&result.location)
        .bind(&result.duplicates_location)
        .bind(&result.database_duplicates_location)
        .bind(TableStatus::Ready.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a table's tags
    pub async fn update_table_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        sqlx::query("UPDATE lead_tables SET tags_json = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(tags)?)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a table, its collection links and its import history
    pub async fn delete_table(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM collection_columns WHERE table_id = ?",
            "DELETE FROM collection_tables WHERE table_id = ?",
            "DELETE FROM import_runs WHERE table_id = ?",
            "DELETE FROM lead_tables WHERE id = ?",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Drop a table row that never completed an import
    pub async fn discard_pending_table(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM lead_tables WHERE id = ? AND status = ?")
            .bind(id)
            .bind(TableStatus::Pending.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Collection Operations =====

    /// Insert a new collection
    pub async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, name, owner, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&collection.id)
        .bind(&collection.name)
        .bind(&collection.owner)
        .bind(&collection.created_at)
        .bind(&collection.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve a collection by ID or name
    pub async fn resolve_collection(&self, id_or_name: &str) -> Result<Collection> {
        sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = ? OR name = ?")
            .bind(id_or_name)
            .bind(id_or_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(id_or_name.to_string()))
    }

    /// List all collections
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections =
            sqlx::query_as::<_, Collection>("SELECT * FROM collections ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(collections)
    }

    /// Attach a table to a collection; attaching twice is a no-op
    pub async fn attach_table(&self, collection_id: &str, table_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_tables (collection_id, table_id, position)
            SELECT ?, ?, COALESCE(MAX(position), -1) + 1
            FROM collection_tables WHERE collection_id = ?
            ON CONFLICT(collection_id, table_id) DO NOTHING
            "#,
        )
        .bind(collection_id)
        .bind(table_id)
        .bind(collection_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Map a logical column onto a table column (replaces an earlier mapping)
    pub async fn map_column(
        &self,
        collection_id: &str,
        logical: &str,
        table_id: &str,
        physical: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_columns (collection_id, logical, table_id, physical, position)
            SELECT ?, ?, ?, ?, COALESCE(MAX(position), -1) + 1
            FROM collection_columns WHERE collection_id = ?
            ON CONFLICT(collection_id, logical, table_id) DO UPDATE SET
                physical = excluded.physical
            "#,
        )
        .bind(collection_id)
        .bind(logical.trim())
        .bind(table_id)
        .bind(physical.trim())
        .bind(collection_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Column mappings of a collection, in mapping order
    pub async fn list_column_mappings(&self, collection_id: &str) -> Result<Vec<ColumnMapping>> {
        let mappings = sqlx::query_as::<_, ColumnMapping>(
            r#"
            SELECT logical, table_id, physical FROM collection_columns
            WHERE collection_id = ? ORDER BY position
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }

    /// Tables attached to a collection, in scan order
    pub async fn collection_tables(&self, collection_id: &str) -> Result<Vec<LeadTable>> {
        let tables = sqlx::query_as::<_, LeadTable>(
            r#"
            SELECT t.* FROM collection_tables ct
            JOIN lead_tables t ON t.id = ct.table_id
            WHERE ct.collection_id = ?
            ORDER BY ct.position
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    /// Everything the extractor needs about a collection
    pub async fn collection_layout(&self, collection_id: &str) -> Result<CollectionLayout> {
        let mut layout = CollectionLayout::new(collection_id);
        for table in self.collection_tables(collection_id).await? {
            match table.source()? {
                Some(source) => layout.tables.push(source),
                None => debug!(table = %table.id, "Skipping table without a file"),
            }
        }
        for mapping in self.list_column_mappings(collection_id).await? {
            layout.map_column(&mapping.logical, &mapping.table_id, &mapping.physical);
        }
        Ok(layout)
    }

    // ===== Purchase Ledger Operations =====

    /// Record purchases in one transaction; already-recorded leads are skipped.
    /// Returns the leads this call actually recorded.
    pub async fn insert_purchases(
        &self,
        buyer: &str,
        collection_id: &str,
        lead_ids: &[LeadId],
    ) -> Result<Vec<LeadId>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut added = Vec::with_capacity(lead_ids.len());
        for lead_id in lead_ids {
            let result = sqlx::query(
                r#"
                INSERT INTO purchased_leads (buyer, collection_id, lead_id, purchased_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(buyer, collection_id, lead_id) DO NOTHING
                "#,
            )
            .bind(buyer)
            .bind(collection_id)
            .bind(lead_id.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                added.push(lead_id.clone());
            }
        }
        tx.commit().await?;
        debug!(
            buyer,
            collection_id,
            added = added.len(),
            requested = lead_ids.len(),
            "Recorded purchases"
        );
        Ok(added)
    }

    /// Lead ids a buyer holds from a collection
    pub async fn purchased_lead_ids(
        &self,
        buyer: &str,
        collection_id: &str,
    ) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT lead_id FROM purchased_leads WHERE buyer = ? AND collection_id = ?",
        )
        .bind(buyer)
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    /// Number of leads a buyer holds, optionally from one collection
    pub async fn purchase_count(&self, buyer: &str, collection_id: Option<&str>) -> Result<u64> {
        let count: i64 = match collection_id {
            Some(collection_id) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM purchased_leads WHERE buyer = ? AND collection_id = ?",
                )
                .bind(buyer)
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM purchased_leads WHERE buyer = ?")
                    .bind(buyer)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    // ===== Import Run Operations =====

    /// Start a new import run
    pub async fn start_import_run(&self, table_id: &str) -> Result<ImportRun> {
        let run = ImportRun::new(table_id.to_string());
        sqlx::query(
            r#"
            INSERT INTO import_runs (id, table_id, started_at, status)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.table_id)
        .bind(&run.started_at)
        .bind(&run.status)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete an import run with its result
    pub async fn complete_import_run(&self, id: &str, result: &ImportResult) -> Result<()> {
        let warnings_json = if result.warnings.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&result.warnings)?)
        };
        sqlx::query(
            r#"
            UPDATE import_runs SET
                completed_at = ?,
                status = ?,
                total_rows = ?,
                skipped_malformed = ?,
                skipped_ragged = ?,
                in_file_duplicates = ?,
                database_duplicates = ?,
                unique_rows = ?,
                warnings_json = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(RunStatus::Completed.to_string())
        .bind(result.total_rows as i64)
        .bind(result.skipped.malformed as i64)
        .bind(result.skipped.ragged as i64)
        .bind(result.in_file_duplicates as i64)
        .bind(result.database_duplicates as i64)
        .bind(result.unique_rows as i64)
        .bind(warnings_json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark an import run failed
    pub async fn fail_import_run(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE import_runs SET completed_at = ?, status = ?, error = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(RunStatus::Failed.to_string())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get latest import run for a table
    pub async fn get_latest_run(&self, table_id: &str) -> Result<Option<ImportRun>> {
        let run = sqlx::query_as::<_, ImportRun>(
            "SELECT * FROM import_runs WHERE table_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    // ===== Order Operations =====

    /// Insert a completed order
    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer, collection_id, budget, matched, file_location, filters_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.buyer)
        .bind(&order.collection_id)
        .bind(order.budget)
        .bind(order.matched)
        .bind(&order.file_location)
        .bind(&order.filters_json)
        .bind(&order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Orders placed by a buyer, newest first
    pub async fn list_orders(&self, buyer: &str) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE buyer = ? ORDER BY created_at DESC",
        )
        .bind(buyer)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let table_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_tables")
            .fetch_one(&self.pool)
            .await?;

        let row_count: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(row_count), 0) FROM lead_tables")
                .fetch_one(&self.pool)
                .await?;

        let collection_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await?;

        let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        let purchase_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchased_leads")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            table_count: table_count as usize,
            row_count: row_count as u64,
            collection_count: collection_count as usize,
            order_count: order_count as usize,
            purchase_count: purchase_count as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SkipCounts;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    fn imported(id: &str, rows: u64) -> ImportResult {
        ImportResult {
            total_rows: rows + 1,
            skipped: SkipCounts {
                malformed: 0,
                ragged: 1,
            },
            unique_rows: rows,
            columns: vec!["lead_id".to_string(), "email".to_string()],
            delimiter: Some(Delimiter::Semicolon),
            location: format!("tables/{id}.csv"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.is_initialized().await.unwrap());

        let table = LeadTable::new("acme".to_string(), "spring".to_string(), vec!["q2".to_string()]);
        db.insert_table(&table).await.unwrap();

        let loaded = db.resolve_table("spring").await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), TableStatus::Pending);
        assert!(loaded.source().unwrap().is_none());
        assert_eq!(loaded.tags(), vec!["q2"]);

        db.complete_table_import(&table.id, &imported(&table.id, 42))
            .await
            .unwrap();
        let loaded = db.get_table(&table.id).await.unwrap().unwrap();
        assert_eq!(loaded.row_count, 42);
        assert_eq!(loaded.columns(), vec!["lead_id", "email"]);
        let source = loaded.source().unwrap().unwrap();
        assert_eq!(source.delimiter, Delimiter::Semicolon);
        assert_eq!(source.location, format!("tables/{}.csv", table.id));

        db.delete_table(&table.id).await.unwrap();
        assert!(matches!(
            db.resolve_table("spring").await,
            Err(Error::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_only_touches_pending_tables() {
        let (db, _tmp) = setup_test_db().await;
        let pending = LeadTable::new("acme".to_string(), "p".to_string(), vec![]);
        let ready = LeadTable::new("acme".to_string(), "r".to_string(), vec![]);
        db.insert_table(&pending).await.unwrap();
        db.insert_table(&ready).await.unwrap();
        db.complete_table_import(&ready.id, &imported(&ready.id, 2))
            .await
            .unwrap();

        db.discard_pending_table(&pending.id).await.unwrap();
        db.discard_pending_table(&ready.id).await.unwrap();
        assert!(db.get_table(&pending.id).await.unwrap().is_none());
        assert!(db.get_table(&ready.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_owner_sources_exclude_pending_and_self() {
        let (db, _tmp) = setup_test_db().await;
        let a = LeadTable::new("acme".to_string(), "a".to_string(), vec![]);
        let b = LeadTable::new("acme".to_string(), "b".to_string(), vec![]);
        let c = LeadTable::new("acme".to_string(), "c".to_string(), vec![]);
        let other = LeadTable::new("zeta".to_string(), "a".to_string(), vec![]);
        for t in [&a, &b, &c, &other] {
            db.insert_table(t).await.unwrap();
        }
        db.complete_table_import(&a.id, &imported(&a.id, 1)).await.unwrap();
        db.complete_table_import(&c.id, &imported(&c.id, 1)).await.unwrap();
        db.complete_table_import(&other.id, &imported(&other.id, 1))
            .await
            .unwrap();

        let sources = db.owner_table_sources("acme", &c.id).await.unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str()]);
    }

    #[tokio::test]
    async fn test_collection_layout() {
        let (db, _tmp) = setup_test_db().await;
        let t1 = LeadTable::new("acme".to_string(), "t1".to_string(), vec![]);
        let t2 = LeadTable::new("acme".to_string(), "t2".to_string(), vec![]);
        db.insert_table(&t1).await.unwrap();
        db.insert_table(&t2).await.unwrap();
        db.complete_table_import(&t1.id, &imported(&t1.id, 3)).await.unwrap();
        db.complete_table_import(&t2.id, &imported(&t2.id, 3)).await.unwrap();

        let collection = Collection::new("acme".to_string(), "west".to_string());
        db.insert_collection(&collection).await.unwrap();
        db.attach_table(&collection.id, &t2.id).await.unwrap();
        db.attach_table(&collection.id, &t1.id).await.unwrap();
        db.attach_table(&collection.id, &t2.id).await.unwrap();
        db.map_column(&collection.id, "State", &t1.id, "state").await.unwrap();
        db.map_column(&collection.id, "Email", &t1.id, "email").await.unwrap();
        db.map_column(&collection.id, "State", &t2.id, "st").await.unwrap();
        db.map_column(&collection.id, "State", &t2.id, "ST").await.unwrap();

        let resolved = db.resolve_collection("west").await.unwrap();
        assert_eq!(resolved.id, collection.id);

        let layout = db.collection_layout(&collection.id).await.unwrap();
        let order: Vec<&str> = layout.tables.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec![t2.id.as_str(), t1.id.as_str()]);
        assert_eq!(layout.columns, vec!["State", "Email"]);
        assert_eq!(layout.physical("state", &t2.id), Some("ST"));
        assert_eq!(layout.physical("email", &t2.id), None);
    }

    #[tokio::test]
    async fn test_purchases_are_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        let ids = vec![LeadId::from_bits(7), LeadId::from_bits(8)];

        assert_eq!(db.insert_purchases("buyer", "c1", &ids).await.unwrap(), ids);
        assert!(db.insert_purchases("buyer", "c1", &ids).await.unwrap().is_empty());

        // Only the lead nobody recorded yet comes back
        let more = vec![ids[0].clone(), LeadId::from_bits(9)];
        assert_eq!(
            db.insert_purchases("buyer", "c1", &more).await.unwrap(),
            vec![LeadId::from_bits(9)]
        );
        assert_eq!(db.purchase_count("buyer", Some("c1")).await.unwrap(), 3);

        db.insert_purchases("buyer", "c2", &ids[..1]).await.unwrap();
        assert_eq!(db.purchase_count("buyer", None).await.unwrap(), 4);
        let held = db.purchased_lead_ids("buyer", "c1").await.unwrap();
        assert!(held.contains(ids[1].as_str()));
        assert!(db.purchased_lead_ids("other", "c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_run_history() {
        let (db, _tmp) = setup_test_db().await;
        let run = db.start_import_run("t1").await.unwrap();
        db.complete_import_run(&run.id, &imported("t1", 9)).await.unwrap();

        let latest = db.get_latest_run("t1").await.unwrap().unwrap();
        assert_eq!(latest.status, "completed");
        assert_eq!(latest.unique_rows, 9);
        assert_eq!(latest.skipped_ragged, 1);

        let failed = db.start_import_run("t2").await.unwrap();
        db.fail_import_run(&failed.id, "disk full").await.unwrap();
        let latest = db.get_latest_run("t2").await.unwrap().unwrap();
        assert_eq!(latest.status, "failed");
        assert_eq!(latest.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_global_stats() {
        let (db, _tmp) = setup_test_db().await;
        let t = LeadTable::new("acme".to_string(), "t".to_string(), vec![]);
        db.insert_table(&t).await.unwrap();
        db.complete_table_import(&t.id, &imported(&t.id, 5)).await.unwrap();
        db.insert_purchases("b", "c", &[LeadId::from_bits(1)]).await.unwrap();
        let mut order = Order::new("b".to_string(), "c".to_string(), 10, "{}".to_string());
        order.matched = 1;
        db.insert_order(&order).await.unwrap();

        let stats = db.get_global_stats().await.unwrap();
        assert_eq!(stats.table_count, 1);
        assert_eq!(stats.row_count, 5);
        assert_eq!(stats.order_count, 1);
        assert_eq!(stats.purchase_count, 1);
        let orders = db.list_orders("b").await.unwrap();
        assert_eq!(orders[0].file_location, format!("orders/{}.csv", orders[0].id));
    }
}
