//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Lead tables: one row per imported table file
CREATE TABLE IF NOT EXISTS lead_tables (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    columns_json TEXT NOT NULL DEFAULT '[]',
    delimiter TEXT NOT NULL DEFAULT 'comma',
    row_count INTEGER NOT NULL DEFAULT 0,
    tags_json TEXT NOT NULL DEFAULT '[]',
    file_location TEXT,
    duplicates_location TEXT,
    db_duplicates_location TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(owner, name)
);

-- Collections: buyer-facing views over lead tables
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Tables attached to a collection, in scan order
CREATE TABLE IF NOT EXISTS collection_tables (
    collection_id TEXT NOT NULL REFERENCES collections(id),
    table_id TEXT NOT NULL REFERENCES lead_tables(id),
    position INTEGER NOT NULL,
    UNIQUE(collection_id, table_id)
);

-- Logical column -> physical column per table
CREATE TABLE IF NOT EXISTS collection_columns (
    collection_id TEXT NOT NULL REFERENCES collections(id),
    logical TEXT NOT NULL,
    table_id TEXT NOT NULL REFERENCES lead_tables(id),
    physical TEXT NOT NULL,
    position INTEGER NOT NULL,
    UNIQUE(collection_id, logical, table_id)
);

-- Purchase ledger: a lead is sold to a buyer at most once per collection
CREATE TABLE IF NOT EXISTS purchased_leads (
    buyer TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    lead_id TEXT NOT NULL,
    purchased_at TEXT NOT NULL,
    UNIQUE(buyer, collection_id, lead_id)
);

-- Import runs: history of every import attempt
CREATE TABLE IF NOT EXISTS import_runs (
    id TEXT PRIMARY KEY,
    table_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    total_rows INTEGER DEFAULT 0,
    skipped_malformed INTEGER DEFAULT 0,
    skipped_ragged INTEGER DEFAULT 0,
    in_file_duplicates INTEGER DEFAULT 0,
    database_duplicates INTEGER DEFAULT 0,
    unique_rows INTEGER DEFAULT 0,
    warnings_json TEXT,
    error TEXT
);

-- Orders: one row per completed extraction
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    buyer TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    budget INTEGER NOT NULL,
    matched INTEGER NOT NULL,
    file_location TEXT NOT NULL,
    filters_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_tables_owner ON lead_tables(owner);
CREATE INDEX IF NOT EXISTS idx_collection_tables ON collection_tables(collection_id);
CREATE INDEX IF NOT EXISTS idx_collection_columns ON collection_columns(collection_id);
CREATE INDEX IF NOT EXISTS idx_purchases_buyer ON purchased_leads(buyer, collection_id);
CREATE INDEX IF NOT EXISTS idx_runs_table ON import_runs(table_id);
CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer);
"#;
