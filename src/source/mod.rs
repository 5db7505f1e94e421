//! Invoice Data Source Module
//!
//! The orchestrator pulls pending invoice records from a data source and
//! reports terminal outcomes back to it. The source is an external
//! collaborator specified only at this interface; the in-memory
//! implementation here backs development runs and tests.

mod memory;

pub use memory::{MemorySource, demo_records};

use crate::types::InvoiceRecord;
use async_trait::async_trait;

/// Data source collaborator for pending invoice records
///
/// `fetch_pending` drains the current pending set; `mark_processed` /
/// `mark_failed` are called once per record after the batch reaches a
/// terminal outcome.
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    /// Drain and return all records currently pending submission
    async fn fetch_pending(&self) -> Vec<InvoiceRecord>;

    /// Allocate the next batch sequence number
    async fn next_batch_number(&self) -> u64;

    /// Record that an official invoice number was issued for a record
    async fn mark_processed(&self, record_index: usize, invoice_number: &str);

    /// Record that the authority rejected a record
    async fn mark_failed(&self, record_index: usize, reason: &str);
}
