//! Order command implementation

use crate::blob::BlobStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{extract, retain_leads, ExtractRequest, ExtractResult, Filters};
use crate::ledger::PurchaseLedger;
use crate::meta::{MetaDb, Order};
use crate::reader::Delimiter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A buyer's order against a collection
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub buyer: String,
    /// Collection ID or name
    pub collection: String,
    pub filters: Filters,
    pub budget: usize,
    pub output_delimiter: Delimiter,
}

/// Result of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_id: String,
    pub buyer: String,
    pub collection_id: String,
    /// Purchases the ledger had not seen before
    pub recorded: u64,
    pub result: ExtractResult,
}

/// Extract up to `budget` unpurchased matching leads and record them as sold.
///
/// The purchased set is read before the scan, so a concurrent order for the
/// same buyer and collection may claim some of the extracted leads first.
/// Those leads are dropped from the result and from the output file; the
/// order is not refilled in their place.
pub async fn cmd_order(
    config: &Config,
    db: &MetaDb,
    ledger: &dyn PurchaseLedger,
    store: Arc<dyn BlobStore>,
    request: OrderRequest,
) -> Result<OrderOutcome> {
    if request.budget > config.order.max_budget {
        return Err(Error::Config(format!(
            "Budget {} exceeds order.max_budget ({})",
            request.budget, config.order.max_budget
        )));
    }

    let collection = db.resolve_collection(&request.collection).await?;
    let layout = db.collection_layout(&collection.id).await?;
    let purchased = ledger
        .already_purchased(&request.buyer, &collection.id)
        .await?;

    let mut order = Order::new(
        request.buyer.clone(),
        collection.id.clone(),
        request.budget,
        serde_json::to_string(&request.filters)?,
    );

    info!(
        buyer = %request.buyer,
        collection = %collection.name,
        budget = request.budget,
        tables = layout.tables.len(),
        already_purchased = purchased.len(),
        "Building order"
    );

    let output_path = order.file_location.clone();
    let filters = request.filters;
    let budget = request.budget;
    let output_delimiter = request.output_delimiter;
    let buffer_capacity = config.import.buffer_capacity;
    let extract_store = Arc::clone(&store);
    let mut result = tokio::task::spawn_blocking(move || {
        extract(
            &*extract_store,
            &ExtractRequest {
                layout: &layout,
                filters: &filters,
                budget,
                purchased: &purchased,
                output_path: &output_path,
                output_delimiter,
                buffer_capacity,
            },
        )
    })
    .await??;

    for warning in &result.warnings {
        warn!("{}", warning);
    }

    let recorded = ledger
        .record_purchases(&request.buyer, &collection.id, &result.lead_ids)
        .await?;

    if recorded.len() < result.lead_ids.len() {
        let keep: HashSet<String> = recorded.iter().map(|id| id.as_str().to_string()).collect();
        let lost = result.lead_ids.len() - recorded.len();
        warn!(
            buyer = %request.buyer,
            collection = %collection.name,
            lost,
            "Leads were claimed by a concurrent order; dropping them"
        );
        result.lead_ids.retain(|id| keep.contains(id.as_str()));
        result.matched = result.lead_ids.len();
        result.already_purchased += lost as u64;

        let location = result.location.clone();
        tokio::task::spawn_blocking(move || {
            retain_leads(&*store, &location, output_delimiter, &keep, buffer_capacity)
        })
        .await??;
    }

    order.matched = result.matched as i64;
    order.file_location = result.location.clone();
    db.insert_order(&order).await?;

    Ok(OrderOutcome {
        order_id: order.id,
        buyer: order.buyer,
        collection_id: order.collection_id,
        recorded: recorded.len() as u64,
        result,
    })
}

/// Print order summary to console
pub fn print_order_outcome(outcome: &OrderOutcome) {
    let r = &outcome.result;
    println!("\n✓ Order {} complete", outcome.order_id);
    println!("  Leads delivered: {}", r.matched);
    println!("  Output file: {}", r.location);
    println!(
        "  Scanned: {} rows across {} table(s)",
        r.rows_scanned, r.tables_scanned
    );
    println!("  Skipped as already purchased: {}", r.already_purchased);
    if r.skipped_rows > 0 {
        println!("  Rows without a valid lead id: {}", r.skipped_rows);
    }
    for warning in &r.warnings {
        println!("  ⚠ {}", warning);
    }
}
