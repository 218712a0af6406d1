//! Purchase history command

use crate::error::Result;
use crate::meta::{MetaDb, Order};
use serde::{Deserialize, Serialize};

/// What a buyer holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSummary {
    pub buyer: String,
    pub collection_id: Option<String>,
    pub purchased: u64,
    pub orders: Vec<Order>,
}

/// Summarize a buyer's purchases, optionally for one collection (ID or name)
pub async fn cmd_purchases(
    db: &MetaDb,
    buyer: &str,
    collection: Option<&str>,
) -> Result<PurchaseSummary> {
    let collection_id = match collection {
        Some(c) => Some(db.resolve_collection(c).await?.id),
        None => None,
    };
    let purchased = db.purchase_count(buyer, collection_id.as_deref()).await?;
    let orders = db
        .list_orders(buyer)
        .await?
        .into_iter()
        .filter(|o| collection_id.as_ref().map_or(true, |c| &o.collection_id == c))
        .collect();

    Ok(PurchaseSummary {
        buyer: buyer.to_string(),
        collection_id,
        purchased,
        orders,
    })
}

/// Print purchase summary to console
pub fn print_purchases(summary: &PurchaseSummary) {
    println!("\n🧾 Purchases for {}\n", summary.buyer);
    println!("Leads held: {}", summary.purchased);
    if summary.orders.is_empty() {
        println!("No orders.");
        return;
    }
    println!("Orders:");
    for order in &summary.orders {
        println!(
            "  {} {} / {} leads -> {} ({})",
            order.id, order.matched, order.budget, order.file_location, order.created_at
        );
    }
}
