//! Collection management commands

use crate::error::{Error, Result};
use crate::meta::{Collection, ColumnMapping, MetaDb, TableStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Collection with its tables and column mappings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(flatten)]
    pub collection: Collection,
    /// Table IDs in scan order
    pub tables: Vec<String>,
    pub mappings: Vec<ColumnMapping>,
}

/// Create a collection
pub async fn cmd_create_collection(db: &MetaDb, owner: &str, name: &str) -> Result<Collection> {
    let collection = Collection::new(owner.to_string(), name.to_string());
    db.insert_collection(&collection).await?;
    info!(collection = %collection.id, name, "Created collection");
    Ok(collection)
}

/// List collections with their layout
pub async fn cmd_list_collections(db: &MetaDb) -> Result<Vec<CollectionInfo>> {
    let collections = db.list_collections().await?;
    let mut result = Vec::with_capacity(collections.len());
    for collection in collections {
        let tables = db
            .collection_tables(&collection.id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        let mappings = db.list_column_mappings(&collection.id).await?;
        result.push(CollectionInfo {
            collection,
            tables,
            mappings,
        });
    }
    Ok(result)
}

/// Attach a table to the end of a collection's scan order
pub async fn cmd_attach_table(db: &MetaDb, collection: &str, table: &str) -> Result<()> {
    let collection = db.resolve_collection(collection).await?;
    let table = db.resolve_table(table).await?;
    db.attach_table(&collection.id, &table.id).await?;
    info!(collection = %collection.name, table = %table.name, "Attached table");
    Ok(())
}

/// Map a logical column of a collection onto a column of one of its tables.
///
/// The table is attached if it is not already. For imported tables the
/// physical column must exist in the table header.
pub async fn cmd_map_column(
    db: &MetaDb,
    collection: &str,
    logical: &str,
    table: &str,
    physical: &str,
) -> Result<()> {
    let collection = db.resolve_collection(collection).await?;
    let table = db.resolve_table(table).await?;

    if table.get_status()? == TableStatus::Ready
        && !table
            .columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(physical.trim()))
    {
        return Err(Error::UnknownColumn {
            column: physical.to_string(),
            context: format!("table '{}'", table.name),
        });
    }

    db.attach_table(&collection.id, &table.id).await?;
    db.map_column(&collection.id, logical, &table.id, physical)
        .await?;
    info!(
        collection = %collection.name,
        logical,
        table = %table.name,
        physical,
        "Mapped column"
    );
    Ok(())
}

/// Print collections to console
pub fn print_collections(collections: &[CollectionInfo]) {
    println!("\n🗂  Collections\n");

    if collections.is_empty() {
        println!("No collections yet. Use 'leadpipe collections create' to add one.");
        return;
    }

    for info in collections {
        println!("• {} (owner {})", info.collection.name, info.collection.owner);
        println!("  ID: {}", info.collection.id);
        println!("  Tables: {}", info.tables.len());
        for mapping in &info.mappings {
            println!(
                "    {} -> {}.{}",
                mapping.logical, mapping.table_id, mapping.physical
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::import::ImportResult;
    use crate::meta::LeadTable;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_map_column_checks_header_and_attaches() {
        let (db, _tmp) = setup_test_db().await;
        let table = LeadTable::new("acme".to_string(), "t".to_string(), vec![]);
        db.insert_table(&table).await.unwrap();
        db.complete_table_import(
            &table.id,
            &ImportResult {
                columns: vec!["lead_id".to_string(), "State".to_string()],
                location: "tables/t.csv".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        cmd_create_collection(&db, "acme", "west").await.unwrap();

        let err = cmd_map_column(&db, "west", "Zip", "t", "zip").await.unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));

        cmd_map_column(&db, "west", "State", "t", "state").await.unwrap();

        let listed = cmd_list_collections(&db).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tables, vec![table.id.clone()]);
        assert_eq!(listed[0].mappings.len(), 1);
        assert_eq!(listed[0].mappings[0].physical, "state");
    }

    #[tokio::test]
    async fn test_duplicate_collection_name_is_rejected() {
        let (db, _tmp) = setup_test_db().await;
        cmd_create_collection(&db, "acme", "west").await.unwrap();
        assert!(cmd_create_collection(&db, "zeta", "west").await.is_err());
    }
}
