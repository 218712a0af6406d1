//! Order extraction: budget-bounded filtered scan over collection tables
//!
//! Tables are scanned in the collection's order, rows in file order. The scan
//! stops the moment the budget is filled; later rows and tables are never
//! opened. Rows already sold to the buyer from this collection are passed
//! over without counting against the budget.

mod collection;
mod predicate;

pub use collection::*;
pub use predicate::*;

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::ident::{LeadId, LEAD_ID_COLUMN};
use crate::reader::{open_rows, Delimiter, RaggedRows, ReaderOptions, RowWriter, RowSink};
use crate::table::TableSource;
use crate::warning::SourceWarning;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Inputs of one extraction
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub layout: &'a CollectionLayout,
    pub filters: &'a Filters,
    /// Maximum rows to return
    pub budget: usize,
    /// Lead ids this buyer already holds from this collection
    pub purchased: &'a HashSet<String>,
    pub output_path: &'a str,
    pub output_delimiter: Delimiter,
    pub buffer_capacity: usize,
}

/// What an extraction produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    pub location: String,
    pub matched: usize,
    pub lead_ids: Vec<LeadId>,
    pub rows_scanned: u64,
    pub tables_scanned: usize,
    /// Matching rows passed over because the buyer already has them
    pub already_purchased: u64,
    /// Rows dropped by the reader or carrying no valid lead id
    pub skipped_rows: u64,
    pub warnings: Vec<SourceWarning>,
}

/// Column positions for one source table
struct TablePlan {
    lead_id: usize,
    tests: Vec<(usize, Matcher)>,
    projection: Vec<Option<usize>>,
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    let wanted = name.trim();
    headers.iter().position(|h| h.eq_ignore_ascii_case(wanted))
}

/// `Ok(None)` means the table has no mapping for some filtered column and so
/// cannot contribute rows. `Err` carries the reason the table is unusable.
fn plan_table(
    layout: &CollectionLayout,
    table_id: &str,
    headers: &[String],
    matchers: &[(String, Matcher)],
) -> std::result::Result<Option<TablePlan>, String> {
    let lead_id = header_index(headers, LEAD_ID_COLUMN)
        .ok_or_else(|| format!("no {} column", LEAD_ID_COLUMN))?;

    let mut tests = Vec::with_capacity(matchers.len());
    for (logical, matcher) in matchers {
        let Some(physical) = layout.physical(logical, table_id) else {
            return Ok(None);
        };
        let idx = header_index(headers, physical)
            .ok_or_else(|| format!("mapped column '{}' not in header", physical))?;
        tests.push((idx, matcher.clone()));
    }

    let projection = layout
        .columns
        .iter()
        .map(|logical| {
            layout
                .physical(logical, table_id)
                .and_then(|physical| header_index(headers, physical))
        })
        .collect();

    Ok(Some(TablePlan {
        lead_id,
        tests,
        projection,
    }))
}

/// Run an extraction and commit its output file.
///
/// Fails with [`Error::NoDataAvailable`] when every table it tried to read
/// was unusable. On any error the output is not committed.
pub fn extract(store: &dyn BlobStore, request: &ExtractRequest<'_>) -> Result<ExtractResult> {
    let layout = request.layout;
    for column in request.filters.keys() {
        if !layout.has_column(column) {
            return Err(Error::UnknownColumn {
                column: column.clone(),
                context: format!("collection {}", layout.id),
            });
        }
    }
    let matchers = request
        .filters
        .iter()
        .map(|(column, predicate)| Ok((column.clone(), predicate.compile(column)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut header = vec![LEAD_ID_COLUMN.to_string()];
    header.extend(layout.columns.iter().cloned());
    let sink = store.create(request.output_path)?;
    let mut writer = RowWriter::new(sink, request.output_delimiter, &header)?;

    let mut result = ExtractResult {
        location: String::new(),
        matched: 0,
        lead_ids: Vec::new(),
        rows_scanned: 0,
        tables_scanned: 0,
        already_purchased: 0,
        skipped_rows: 0,
        warnings: Vec::new(),
    };
    let mut emitted: HashSet<String> = HashSet::new();
    let mut attempted = 0usize;
    let mut readable = 0usize;

    for table in &layout.tables {
        if result.matched >= request.budget {
            break;
        }
        attempted += 1;
        match scan_table(store, request, table, &matchers, &mut writer, &mut emitted, &mut result)? {
            Ok(()) => readable += 1,
            Err(reason) => {
                warn!(table = %table.id, error = %reason, "Skipping unreadable source table");
                result
                    .warnings
                    .push(SourceWarning::new(&table.id, &table.location, reason));
            }
        }
    }

    if request.budget > 0 && readable == 0 {
        return Err(Error::NoDataAvailable(attempted));
    }

    result.location = writer.into_inner()?.commit()?;
    info!(
        collection = %layout.id,
        matched = result.matched,
        budget = request.budget,
        scanned = result.rows_scanned,
        tables = result.tables_scanned,
        "Extraction complete"
    );
    Ok(result)
}

/// Rewrite an order output in place, keeping only rows whose lead id is in
/// `keep`. Returns the rows left.
pub fn retain_leads(
    store: &dyn BlobStore,
    location: &str,
    delimiter: Delimiter,
    keep: &HashSet<String>,
    buffer_capacity: usize,
) -> Result<u64> {
    let options = ReaderOptions::new(delimiter, RaggedRows::Pad).with_buffer_capacity(buffer_capacity);
    let mut rows = open_rows(store.open(location)?, options)?;
    let header = rows.headers().to_vec();
    let mut writer = RowWriter::new(store.create(location)?, delimiter, &header)?;
    for row in rows.by_ref() {
        let row = row?;
        if keep.contains(row.get(0)) {
            writer.write_row(&row.fields)?;
        }
    }
    let kept = writer.rows();
    writer.into_inner()?.commit()?;
    debug!(location, kept, "Rewrote order output");
    Ok(kept)
}

/// Scan one table into `writer`.
///
/// The inner `Err` means the table could not be used; the outer one is a
/// failure writing the output.
fn scan_table<W: std::io::Write>(
    store: &dyn BlobStore,
    request: &ExtractRequest<'_>,
    table: &TableSource,
    matchers: &[(String, Matcher)],
    writer: &mut RowWriter<W>,
    emitted: &mut HashSet<String>,
    result: &mut ExtractResult,
) -> Result<std::result::Result<(), String>> {
    let source = match store.open(&table.location) {
        Ok(source) => source,
        Err(e) => return Ok(Err(e.to_string())),
    };
    let options = ReaderOptions::new(table.delimiter, RaggedRows::Pad)
        .with_buffer_capacity(request.buffer_capacity);
    let mut rows = match open_rows(source, options) {
        Ok(rows) => rows,
        Err(e) => return Ok(Err(e.to_string())),
    };

    let plan = match plan_table(request.layout, &table.id, rows.headers(), matchers) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            debug!(table = %table.id, "Table lacks a mapping for a filtered column");
            return Ok(Ok(()));
        }
        Err(reason) => return Ok(Err(reason)),
    };
    result.tables_scanned += 1;

    let mut outcome = Ok(());
    for row in rows.by_ref() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                // Matches already written stay valid
                outcome = Err(format!("read failed mid-table: {}", e));
                break;
            }
        };
        result.rows_scanned += 1;

        let raw_id = row.get(plan.lead_id).trim();
        let Ok(lead_id) = raw_id.parse::<LeadId>() else {
            result.skipped_rows += 1;
            continue;
        };
        if !plan.tests.iter().all(|(idx, m)| m.matches(row.get(*idx))) {
            continue;
        }
        if request.purchased.contains(lead_id.as_str()) {
            result.already_purchased += 1;
            continue;
        }
        if !emitted.insert(lead_id.as_str().to_string()) {
            continue;
        }

        let mut out = Vec::with_capacity(plan.projection.len() + 1);
        out.push(lead_id.as_str().to_string());
        out.extend(
            plan.projection
                .iter()
                .map(|idx| idx.map(|i| row.get(i).to_string()).unwrap_or_default()),
        );
        writer.write_row(&out)?;
        result.lead_ids.push(lead_id);
        result.matched += 1;
        if result.matched >= request.budget {
            break;
        }
    }
    result.skipped_rows += rows.skipped().total();

    if let Err(reason) = outcome {
        warn!(table = %table.id, error = %reason, "Source table only partly read");
        result
            .warnings
            .push(SourceWarning::new(&table.id, &table.location, reason));
    }
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use std::fmt::Write as _;

    const OUT: &str = "orders/o1.csv";

    /// `rows` rows; row i has state CA when `is_match(i)`, else TX
    fn table_csv(rows: usize, is_match: impl Fn(usize) -> bool) -> String {
        let mut csv = String::from("lead_id,state,age,email\n");
        for i in 0..rows {
            let state = if is_match(i) { "CA" } else { "TX" };
            let _ = writeln!(
                csv,
                "{},{},{},user{}@example.com",
                LeadId::from_bits(i as u64),
                state,
                20 + i % 50,
                i
            );
        }
        csv
    }

    fn layout(tables: &[&str]) -> CollectionLayout {
        let mut layout = CollectionLayout::new("c1");
        for id in tables {
            layout = layout
                .with_table(TableSource::new(*id, format!("tables/{id}.csv"), Delimiter::Comma))
                .with_mapping("State", id, "state")
                .with_mapping("Email", id, "email");
        }
        layout
    }

    fn state_ca() -> Filters {
        parse_filters(r#"{"State":{"type":"one_of","values":["ca"]}}"#).unwrap()
    }

    fn request<'a>(
        layout: &'a CollectionLayout,
        filters: &'a Filters,
        budget: usize,
        purchased: &'a HashSet<String>,
    ) -> ExtractRequest<'a> {
        ExtractRequest {
            layout,
            filters,
            budget,
            purchased,
            output_path: OUT,
            output_delimiter: Delimiter::Comma,
            buffer_capacity: 1024,
        }
    }

    #[test]
    fn test_stops_reading_once_budget_is_filled() {
        let store = MemoryBlobStore::new();
        let big = table_csv(200_000, |_| true);
        let big_len = big.len() as u64;
        store.put("tables/big.csv", big);
        store.put("tables/next.csv", table_csv(10, |_| true));

        let layout = layout(&["big", "next"]);
        let filters = state_ca();
        let purchased = HashSet::new();
        let result = extract(&store, &request(&layout, &filters, 10, &purchased)).unwrap();

        assert_eq!(result.matched, 10);
        assert_eq!(result.rows_scanned, 10);
        assert_eq!(store.open_count("tables/next.csv"), 0);
        assert!(store.bytes_read() < 16 * 1024, "read {} of {}", store.bytes_read(), big_len);
    }

    #[test]
    fn test_budget_over_matches_with_prior_purchases() {
        let store = MemoryBlobStore::new();
        // 250 matching rows: every 80th of 20,000
        store.put("tables/t.csv", table_csv(20_000, |i| i % 80 == 0));
        let layout = layout(&["t"]);
        let filters = state_ca();
        let purchased: HashSet<String> = (0..50)
            .map(|k| LeadId::from_bits(k * 80).into_string())
            .collect();

        let small = extract(&store, &request(&layout, &filters, 100, &purchased)).unwrap();
        assert_eq!(small.matched, 100);
        assert_eq!(small.already_purchased, 50);
        // 150th matching row is row 149 * 80
        assert_eq!(small.rows_scanned, 149 * 80 + 1);

        let large = extract(&store, &request(&layout, &filters, 500, &purchased)).unwrap();
        assert_eq!(large.matched, 200);
        assert_eq!(large.rows_scanned, 20_000);
        assert!(large
            .lead_ids
            .iter()
            .all(|id| !purchased.contains(id.as_str())));
    }

    #[test]
    fn test_repeat_extraction_is_disjoint_once_recorded() {
        let store = MemoryBlobStore::new();
        store.put("tables/t.csv", table_csv(100, |i| i % 2 == 0));
        let layout = layout(&["t"]);
        let filters = state_ca();

        let mut purchased = HashSet::new();
        let first = extract(&store, &request(&layout, &filters, 30, &purchased)).unwrap();
        purchased.extend(first.lead_ids.iter().map(|id| id.to_string()));
        let second = extract(&store, &request(&layout, &filters, 30, &purchased)).unwrap();

        assert_eq!(first.matched, 30);
        assert_eq!(second.matched, 20);
        let a: HashSet<_> = first.lead_ids.iter().collect();
        assert!(second.lead_ids.iter().all(|id| !a.contains(id)));
    }

    #[test]
    fn test_output_projects_collection_columns() {
        let store = MemoryBlobStore::new();
        store.put(
            "tables/a.csv",
            format!(
                "lead_id,state,email\n{},CA,a@x.io\n{},,b@x.io\n",
                LeadId::from_bits(1),
                LeadId::from_bits(2)
            ),
        );
        store.put(
            "tables/b.csv",
            format!("lead_id\tST\n{}\tca\n", LeadId::from_bits(3)),
        );
        let layout = CollectionLayout::new("c1")
            .with_table(TableSource::new("a", "tables/a.csv", Delimiter::Comma))
            .with_table(TableSource::new("b", "tables/b.csv", Delimiter::Tab))
            .with_mapping("State", "a", "state")
            .with_mapping("State", "b", "ST")
            .with_mapping("Email", "a", "email");
        let filters = state_ca();
        let purchased = HashSet::new();

        let result = extract(&store, &request(&layout, &filters, 10, &purchased)).unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(result.tables_scanned, 2);
        assert_eq!(
            store.get_string(OUT).unwrap(),
            format!(
                "lead_id,State,Email\n{},CA,a@x.io\n{},ca,\n",
                LeadId::from_bits(1),
                LeadId::from_bits(3)
            )
        );
    }

    #[test]
    fn test_unreadable_tables_are_skipped() {
        let store = MemoryBlobStore::new();
        store.put("tables/good.csv", table_csv(5, |_| true));
        store.put("tables/locked.csv", table_csv(5, |_| true));
        store.mark_unreadable("tables/locked.csv");

        let layout = layout(&["locked", "missing", "good"]);
        let filters = state_ca();
        let purchased = HashSet::new();
        let result = extract(&store, &request(&layout, &filters, 100, &purchased)).unwrap();

        assert_eq!(result.matched, 5);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].table_id, "locked");
    }

    #[test]
    fn test_no_readable_tables_is_an_error() {
        let store = MemoryBlobStore::new();
        store.put("tables/nolead.csv", "state,email\nCA,a@x.io\n");
        let layout = layout(&["missing", "nolead"]);
        let filters = state_ca();
        let purchased = HashSet::new();

        let err = extract(&store, &request(&layout, &filters, 10, &purchased)).unwrap_err();
        assert!(matches!(err, Error::NoDataAvailable(2)));
        assert!(!store.exists(OUT).unwrap());
    }

    #[test]
    fn test_zero_budget_reads_nothing() {
        let store = MemoryBlobStore::new();
        store.put("tables/t.csv", table_csv(5, |_| true));
        let layout = layout(&["t"]);
        let filters = state_ca();
        let purchased = HashSet::new();

        let result = extract(&store, &request(&layout, &filters, 0, &purchased)).unwrap();
        assert_eq!(result.matched, 0);
        assert_eq!(store.total_opens(), 0);
    }

    #[test]
    fn test_unknown_filter_column() {
        let store = MemoryBlobStore::new();
        let layout = layout(&["t"]);
        let filters = parse_filters(r#"{"zip":{"type":"text_range","min":"9"}}"#).unwrap();
        let purchased = HashSet::new();
        let err = extract(&store, &request(&layout, &filters, 1, &purchased)).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
    }

    #[test]
    fn test_retain_leads_rewrites_output() {
        let store = MemoryBlobStore::new();
        store.put("tables/t.csv", table_csv(6, |_| true));
        let layout = layout(&["t"]);
        let filters = state_ca();
        let purchased = HashSet::new();
        let result = extract(&store, &request(&layout, &filters, 3, &purchased)).unwrap();
        assert_eq!(result.matched, 3);

        let keep: HashSet<String> = [result.lead_ids[1].as_str().to_string()].into();
        let kept = retain_leads(&store, &result.location, Delimiter::Comma, &keep, 1024).unwrap();

        assert_eq!(kept, 1);
        let output = store.get_string(OUT).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "lead_id,State,Email");
        assert!(lines[1].starts_with(result.lead_ids[1].as_str()));
    }
}
