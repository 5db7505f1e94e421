//! Orchestrator implementation
//!
//! One `run` drives a single batch through the pipeline. Stage transitions
//! are linear and recorded in the outcome report as each stage completes.
//! A batch is submitted at most once per run: the retry loop stops at the
//! first successful submission, and a polling timeout preserves the handle
//! instead of resubmitting.

use crate::builder;
use crate::config::Config;
use crate::error::DispatchError;
use crate::signer::{self, SigningCredential};
use crate::source::InvoiceSource;
use crate::transport::NfseTransport;
use crate::types::{
    BatchHeader, BatchResults, BatchStatus, OutcomeReport, SignatureMode, SignedDocument, Stage,
    StatusReply, SubmissionHandle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// Drives pending invoice records through build, sign, submit, poll and
/// result reconciliation
pub struct BatchOrchestrator {
    config: Config,
    source: Arc<dyn InvoiceSource>,
    transport: Arc<dyn NfseTransport>,
}

impl BatchOrchestrator {
    pub fn new(
        config: Config,
        source: Arc<dyn InvoiceSource>,
        transport: Arc<dyn NfseTransport>,
    ) -> Self {
        info!(
            environment = %config.endpoints.environment,
            "batch orchestrator initialized"
        );
        Self {
            config,
            source,
            transport,
        }
    }

    /// Execute one full submission cycle and return its outcome report
    ///
    /// Never panics and never returns early without a report; every failure
    /// path lands in the report's error list alongside the stages that did
    /// complete.
    pub async fn run(&self) -> OutcomeReport {
        let started = Instant::now();
        let mut report = OutcomeReport::new(self.signature_mode());

        // Building
        let records = self.source.fetch_pending().await;
        if records.is_empty() {
            info!("no pending invoice records, nothing to submit");
            report.completed_stages.push(Stage::Building);
            report.success = true;
            report.duration = started.elapsed();
            return report;
        }

        let batch_number = self.source.next_batch_number().await;
        info!(
            batch_number,
            record_count = records.len(),
            "building batch document"
        );

        let header = BatchHeader {
            provider_cnpj: self.config.provider.cnpj.clone(),
            municipal_registration: self.config.provider.municipal_registration.clone(),
            municipality_code: self.config.provider.municipality_code.clone(),
            batch_number,
        };
        let doc = match builder::build(&records, &header) {
            Ok(doc) => doc,
            Err(e) => return self.fail(report, started, e.into()),
        };
        report.completed_stages.push(Stage::Building);

        // Signing
        let credential = self.credential();
        let signed = match signer::sign(doc, credential.as_ref()) {
            Ok(signed) => signed,
            Err(e) => return self.fail(report, started, e.into()),
        };
        report.completed_stages.push(Stage::Signing);

        // Submitting
        let handle = match self.submit_with_backoff(&signed).await {
            Ok(handle) => handle,
            Err(e) => return self.fail(report, started, e),
        };
        // Recorded before polling so a timed-out run still exposes the handle
        report.handle = Some(handle.clone());
        report.completed_stages.push(Stage::Submitting);

        // Polling
        let reply = match self.poll_until_terminal(&handle).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(report, started, e),
        };
        report.completed_stages.push(Stage::Polling);

        // Fetching
        self.reconcile(report, started, &handle, reply).await
    }

    /// Submit the signed document, retrying transient transport failures
    /// with doubling backoff up to the configured ceiling
    async fn submit_with_backoff(
        &self,
        doc: &SignedDocument,
    ) -> Result<SubmissionHandle, DispatchError> {
        let policy = &self.config.submission;
        let max_backoff = Duration::from_millis(policy.max_backoff_ms);
        let mut backoff = Duration::from_millis(policy.initial_backoff_ms);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.submit(doc).await {
                Ok(handle) => {
                    if attempt > 1 {
                        info!(attempt, %handle, "submission succeeded after retries");
                    }
                    return Ok(handle);
                }
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient submission failure, will retry: {e}"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Poll the batch status at a fixed interval until a terminal status,
    /// the attempt ceiling or the wall-clock budget is reached
    async fn poll_until_terminal(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<StatusReply, DispatchError> {
        let policy = &self.config.polling;
        let interval = Duration::from_secs(policy.interval_secs);
        let deadline = Instant::now() + Duration::from_secs(policy.max_wall_clock_secs);

        let mut attempts = 0;
        while attempts < policy.max_attempts {
            attempts += 1;
            match self.transport.query_status(handle).await {
                Ok(reply) if reply.status.is_terminal() => {
                    info!(%handle, attempts, status = %reply.status, "batch reached terminal status");
                    return Ok(reply);
                }
                Ok(reply) => {
                    debug!(%handle, attempts, status = %reply.status, "batch not terminal yet");
                }
                // Transient query failures consume an attempt but not the run
                Err(e) if e.is_retryable() => {
                    warn!(%handle, attempts, "transient status query failure: {e}");
                }
                Err(e) => return Err(e.into()),
            }

            if attempts >= policy.max_attempts || Instant::now() + interval >= deadline {
                break;
            }
            sleep(interval).await;
        }

        Err(DispatchError::PollingTimeout {
            handle: handle.clone(),
            attempts,
        })
    }

    /// Fetch terminal results and report them back to the data source
    async fn reconcile(
        &self,
        mut report: OutcomeReport,
        started: Instant,
        handle: &SubmissionHandle,
        reply: StatusReply,
    ) -> OutcomeReport {
        let results = match self.transport.fetch_results(handle).await {
            Ok(results) => results,
            Err(e) => return self.fail(report, started, e.into()),
        };
        report.completed_stages.push(Stage::Fetching);

        match results {
            BatchResults::Issued(invoices) if reply.status == BatchStatus::Processed => {
                for invoice in &invoices {
                    self.source
                        .mark_processed(invoice.record_index, &invoice.invoice_number)
                        .await;
                }
                info!(
                    %handle,
                    issued = invoices.len(),
                    "batch completed, invoices issued"
                );
                report.invoices = invoices;
                report.success = true;
            }
            BatchResults::Issued(_) => {
                report.errors.push(format!(
                    "service reported `{}` yet returned issued invoices for `{handle}`",
                    reply.status
                ));
            }
            BatchResults::Rejected(rejections) => {
                warn!(
                    %handle,
                    rejected = rejections.len(),
                    "batch rejected by the service"
                );
                for rejection in &rejections {
                    if let Some(index) = rejection.record_index {
                        self.source.mark_failed(index, &rejection.message).await;
                    }
                    report
                        .errors
                        .push(format!("{}: {}", rejection.code, rejection.message));
                }
            }
        }

        report.duration = started.elapsed();
        report
    }

    /// Close out a failed run
    fn fail(
        &self,
        mut report: OutcomeReport,
        started: Instant,
        e: DispatchError,
    ) -> OutcomeReport {
        error!("run failed: {e}");
        report.errors.push(e.to_string());
        report.duration = started.elapsed();
        report
    }

    fn signature_mode(&self) -> SignatureMode {
        if self.config.signing.skip_signature {
            SignatureMode::Passthrough
        } else {
            SignatureMode::Signed
        }
    }

    fn credential(&self) -> Option<SigningCredential> {
        if self.config.signing.skip_signature {
            None
        } else {
            Some(SigningCredential {
                pfx_path: PathBuf::from(&self.config.signing.certificate_path),
                passphrase: self
                    .config
                    .signing
                    .certificate_password
                    .clone()
                    .unwrap_or_default(),
            })
        }
    }
}
