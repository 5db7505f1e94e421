//! Mock Transport
//!
//! Development-mode transport that satisfies the same contract as the SOAP
//! client by synthesizing deterministic responses without any network call.
//! Scripted statuses and injectable transient submit failures let the
//! orchestrator's retry and polling logic be exercised in isolation.

use crate::error::TransportError;
use crate::transport::NfseTransport;
use crate::types::{
    BatchResults, BatchStatus, IssuedInvoice, SignedDocument, StatusReply, SubmissionHandle,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// Deterministic in-process stand-in for the web service
pub struct MockTransport {
    handle: SubmissionHandle,
    /// Remaining injected transient failures before `submit` succeeds
    submit_failures: AtomicU32,
    /// Total number of `submit` invocations observed
    submit_calls: AtomicU32,
    /// Statuses returned by successive `query_status` calls
    statuses: Mutex<VecDeque<BatchStatus>>,
    /// Status returned once the script is exhausted
    final_status: BatchStatus,
    /// Results returned by `fetch_results`; `None` means not ready
    results: Option<BatchResults>,
}

impl MockTransport {
    /// A batch that reports `Processing` once, then completes with one
    /// synthesized invoice number per record, in record order
    pub fn happy(record_count: usize) -> Self {
        let invoices = (0..record_count)
            .map(|record_index| IssuedInvoice {
                record_index,
                invoice_number: format!("{:09}", record_index + 1),
                verification_code: Some(format!("MOCK{record_index:04}")),
                issued_at: Some("2025-09-30T10:00:00".to_string()),
            })
            .collect();

        Self {
            handle: SubmissionHandle("MOCK-00000001".to_string()),
            submit_failures: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            statuses: Mutex::new(VecDeque::from([BatchStatus::Processing])),
            final_status: BatchStatus::Processed,
            results: Some(BatchResults::Issued(invoices)),
        }
    }

    /// A batch the authority rejects with the given per-record reasons
    pub fn rejecting(rejections: Vec<crate::types::RecordRejection>) -> Self {
        Self {
            handle: SubmissionHandle("MOCK-00000001".to_string()),
            submit_failures: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            statuses: Mutex::new(VecDeque::from([BatchStatus::Processing])),
            final_status: BatchStatus::Error,
            results: Some(BatchResults::Rejected(rejections)),
        }
    }

    /// A batch that never leaves `Processing`, for timeout tests
    pub fn never_terminal() -> Self {
        Self {
            handle: SubmissionHandle("MOCK-00000001".to_string()),
            submit_failures: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            statuses: Mutex::new(VecDeque::new()),
            final_status: BatchStatus::Processing,
            results: None,
        }
    }

    /// Make the first `count` submit attempts fail with a transient error
    pub fn with_failing_submits(self, count: u32) -> Self {
        self.submit_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Replace the status script consumed by successive `query_status` calls
    pub fn with_statuses(self, statuses: Vec<BatchStatus>) -> Self {
        *self
            .statuses
            .lock()
            .expect("status script lock poisoned") = statuses.into();
        self
    }

    /// Number of times `submit` has been called
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NfseTransport for MockTransport {
    async fn submit(&self, doc: &SignedDocument) -> Result<SubmissionHandle, TransportError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.submit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect {
                url: "mock://submit".to_string(),
                reason: "injected transient failure".to_string(),
            });
        }

        info!(mode = %doc.mode, "mock transport accepted batch");
        Ok(self.handle.clone())
    }

    async fn query_status(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<StatusReply, TransportError> {
        if *handle != self.handle {
            return Err(TransportError::UnknownHandle(handle.clone()));
        }
        let next = self
            .statuses
            .lock()
            .expect("status script lock poisoned")
            .pop_front()
            .unwrap_or(self.final_status);
        Ok(StatusReply::new(next))
    }

    async fn fetch_results(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchResults, TransportError> {
        if *handle != self.handle {
            return Err(TransportError::UnknownHandle(handle.clone()));
        }
        match &self.results {
            Some(results) => Ok(results.clone()),
            None => Err(TransportError::ResultsNotReady(handle.clone())),
        }
    }
}
