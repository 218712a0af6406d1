//! Purchase ledger: which buyer already holds which leads of a collection
//!
//! Recording is insert-if-absent on (buyer, collection, lead). Re-recording
//! a lead is a no-op, so retried or racing orders never fail on it and never
//! produce a second record. Each call reports the leads it actually claimed;
//! a lead claimed by someone else in the meantime is not the caller's to sell.

use crate::error::Result;
use crate::ident::LeadId;
use crate::meta::MetaDb;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Record leads as sold to `buyer` from `collection_id`.
    /// Returns the leads that were not already recorded, in input order.
    async fn record_purchases(
        &self,
        buyer: &str,
        collection_id: &str,
        lead_ids: &[LeadId],
    ) -> Result<Vec<LeadId>>;

    /// Lead ids `buyer` already holds from `collection_id`
    async fn already_purchased(&self, buyer: &str, collection_id: &str) -> Result<HashSet<String>>;
}

#[async_trait]
impl PurchaseLedger for MetaDb {
    async fn record_purchases(
        &self,
        buyer: &str,
        collection_id: &str,
        lead_ids: &[LeadId],
    ) -> Result<Vec<LeadId>> {
        self.insert_purchases(buyer, collection_id, lead_ids).await
    }

    async fn already_purchased(&self, buyer: &str, collection_id: &str) -> Result<HashSet<String>> {
        self.purchased_lead_ids(buyer, collection_id).await
    }
}

/// Ledger kept in process memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashSet<(String, String, String)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PurchaseLedger for MemoryLedger {
    async fn record_purchases(
        &self,
        buyer: &str,
        collection_id: &str,
        lead_ids: &[LeadId],
    ) -> Result<Vec<LeadId>> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lead_ids
            .iter()
            .filter(|id| {
                records.insert((
                    buyer.to_string(),
                    collection_id.to_string(),
                    id.as_str().to_string(),
                ))
            })
            .cloned()
            .collect())
    }

    async fn already_purchased(&self, buyer: &str, collection_id: &str) -> Result<HashSet<String>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .iter()
            .filter(|(b, c, _)| b == buyer && c == collection_id)
            .map(|(_, _, id)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ledger_is_idempotent() {
        let ledger = MemoryLedger::new();
        let ids = vec![LeadId::from_bits(1), LeadId::from_bits(2)];

        assert_eq!(ledger.record_purchases("b1", "c1", &ids).await.unwrap(), ids);
        assert!(ledger.record_purchases("b1", "c1", &ids).await.unwrap().is_empty());
        assert_eq!(ledger.len(), 2);

        let more = vec![LeadId::from_bits(3), ids[1].clone()];
        assert_eq!(
            ledger.record_purchases("b1", "c1", &more).await.unwrap(),
            vec![LeadId::from_bits(3)]
        );
        assert_eq!(ledger.len(), 3);

        ledger.record_purchases("b2", "c1", &ids[..1]).await.unwrap();
        let held = ledger.already_purchased("b1", "c1").await.unwrap();
        assert_eq!(held.len(), 3);
        assert!(ledger.already_purchased("b1", "c2").await.unwrap().is_empty());
        assert_eq!(ledger.already_purchased("b2", "c1").await.unwrap().len(), 1);
    }
}
