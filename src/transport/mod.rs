//! Transport Client Module
//!
//! Exposes the three remote operations of the municipal web service behind
//! one trait, with polymorphic production/mock implementations selected at
//! configuration time:
//! - `submit`: send a signed batch, returns the protocol handle
//! - `query_status`: poll the processing status of a submitted batch
//! - `fetch_results`: retrieve issued invoice numbers or rejection reasons
//!
//! All three operations are idempotent from the caller's perspective;
//! re-invoking `query_status`/`fetch_results` with the same handle is safe
//! and side-effect-free on the remote system.

mod mock;
mod response;
mod soap;

pub use mock::MockTransport;
pub use soap::SoapTransport;

use crate::config::Config;
use crate::error::TransportError;
use crate::types::{BatchResults, SignedDocument, StatusReply, SubmissionHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// The three remote operations against the authority's service endpoint
#[async_trait]
pub trait NfseTransport: Send + Sync {
    /// Submit a signed batch document; returns the protocol handle used by
    /// all subsequent calls
    async fn submit(&self, doc: &SignedDocument) -> Result<SubmissionHandle, TransportError>;

    /// Query the processing status of a submitted batch
    async fn query_status(&self, handle: &SubmissionHandle) -> Result<StatusReply, TransportError>;

    /// Fetch issued invoice numbers (or rejection reasons) for a terminal batch
    async fn fetch_results(&self, handle: &SubmissionHandle)
    -> Result<BatchResults, TransportError>;
}

/// Create the transport selected by configuration
///
/// The mock transport synthesizes deterministic responses without any
/// network call, so the orchestrator can be exercised without live
/// infrastructure. `mock_records` sizes the invoice list the mock issues.
pub fn create_transport(
    config: &Config,
    mock_records: usize,
) -> Result<Arc<dyn NfseTransport>, TransportError> {
    if config.transport.mock {
        Ok(Arc::new(MockTransport::happy(mock_records)))
    } else {
        Ok(Arc::new(SoapTransport::new(
            config.endpoints.clone(),
            config.provider.clone(),
        )?))
    }
}
