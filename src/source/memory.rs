//! In-Memory Invoice Source
//!
//! Stores pending records in a FIFO queue protected by a read-write lock.
//! Reconciliation calls are journaled so tests and development runs can
//! inspect what the orchestrator reported back.

use crate::config::ProviderConfig;
use crate::source::InvoiceSource;
use crate::types::{InvoiceRecord, ServiceTaker};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory invoice source
///
/// FIFO queue of pending records plus a monotonically increasing batch
/// number counter. Safe to share behind an `Arc`.
pub struct MemorySource {
    /// Queue of pending records, drained whole by `fetch_pending`
    pending: RwLock<VecDeque<InvoiceRecord>>,
    /// Next batch number to allocate (starts at 1)
    next_batch: AtomicU64,
    /// (record index, invoice number) pairs reported as processed
    processed: RwLock<Vec<(usize, String)>>,
    /// (record index, reason) pairs reported as failed
    failed: RwLock<Vec<(usize, String)>>,
}

impl MemorySource {
    /// Creates a new empty source
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(VecDeque::new()),
            next_batch: AtomicU64::new(1),
            processed: RwLock::new(Vec::new()),
            failed: RwLock::new(Vec::new()),
        }
    }

    /// Creates a source pre-loaded with pending records
    pub fn with_records(records: Vec<InvoiceRecord>) -> Self {
        Self {
            pending: RwLock::new(records.into()),
            next_batch: AtomicU64::new(1),
            processed: RwLock::new(Vec::new()),
            failed: RwLock::new(Vec::new()),
        }
    }

    /// Append one pending record
    pub async fn push(&self, record: InvoiceRecord) {
        let mut pending = self.pending.write().await;
        pending.push_back(record);
    }

    /// Number of records currently pending
    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Journal of records reported as processed
    pub async fn processed(&self) -> Vec<(usize, String)> {
        self.processed.read().await.clone()
    }

    /// Journal of records reported as failed
    pub async fn failed(&self) -> Vec<(usize, String)> {
        self.failed.read().await.clone()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceSource for MemorySource {
    async fn fetch_pending(&self) -> Vec<InvoiceRecord> {
        let mut pending = self.pending.write().await;
        pending.drain(..).collect()
    }

    async fn next_batch_number(&self) -> u64 {
        self.next_batch.fetch_add(1, Ordering::SeqCst)
    }

    async fn mark_processed(&self, record_index: usize, invoice_number: &str) {
        let mut processed = self.processed.write().await;
        processed.push((record_index, invoice_number.to_string()));
    }

    async fn mark_failed(&self, record_index: usize, reason: &str) {
        let mut failed = self.failed.write().await;
        failed.push((record_index, reason.to_string()));
    }
}

/// Sample pending records for development runs against the mock transport
pub fn demo_records(provider: &ProviderConfig, count: u64) -> Vec<InvoiceRecord> {
    let issue_date = NaiveDate::from_ymd_opt(2025, 9, 30)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .expect("static demo date is valid");

    (1..=count)
        .map(|number| InvoiceRecord {
            provider_cnpj: provider.cnpj.clone(),
            municipal_registration: provider.municipal_registration.clone(),
            rps_number: number,
            rps_series: "1".to_string(),
            rps_type: 1,
            issue_date,
            description: "IT consulting services".to_string(),
            service_amount: 1000.0,
            iss_amount: 50.0,
            iss_rate: 0.05,
            service_code: "01.01".to_string(),
            municipality_code: provider.municipality_code.clone(),
            taker: ServiceTaker {
                document: "12345678000195".to_string(),
                legal_name: "Empresa Tomadora de Servicos Ltda".to_string(),
                street: "Rua das Flores, 123".to_string(),
                street_number: "123".to_string(),
                district: "Centro".to_string(),
                municipality_code: provider.municipality_code.clone(),
                state: "AL".to_string(),
                postal_code: "57300000".to_string(),
            },
        })
        .collect()
}
