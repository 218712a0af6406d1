//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub blob_root: String,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        blob_root: config.paths.blob_root.display().to_string(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 leadpipe Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Blob root: {}", status.blob_root);
    println!("\nDatabase Stats:");
    println!("  Tables: {}", status.db_stats.table_count);
    println!("  Rows: {}", status.db_stats.row_count);
    println!("  Collections: {}", status.db_stats.collection_count);
    println!("  Orders: {}", status.db_stats.order_count);
    println!("  Purchased leads: {}", status.db_stats.purchase_count);
}
