//! Error Taxonomy Module
//!
//! Each pipeline stage has its own error type with a distinct retry policy:
//! - `ValidationError`: bad input data, non-retryable, fatal to the run
//! - `SigningError`: credential/key problem, non-retryable, fatal
//! - `TransportError`: network-layer failures are retryable with backoff;
//!   protocol-layer rejections are not
//! - `DispatchError`: run-level union, including the polling timeout which
//!   carries the live submission handle so a later run can re-query it

use crate::types::SubmissionHandle;
use std::path::PathBuf;
use thiserror::Error;

/// A record failed schema-mandatory validation in the document builder
///
/// Always names the offending record index and field; the builder fails
/// fast on the first violation and never attempts partial batches.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("record {index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index}: field `{field}` must contain digits only, got `{value}`")]
    MalformedField {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("record {index}: field `{field}` must be a non-negative finite amount, got {value}")]
    InvalidAmount {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("record {index}: field `{field}` is not a valid CNPJ/CPF: `{value}`")]
    InvalidTaxId {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("record {index}: RPS number must be greater than zero")]
    InvalidSequenceNumber { index: usize },
}

/// The signing credential could not be used to produce a signature
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),

    #[error("failed to read certificate {path}: {source}")]
    CertificateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate is not a valid PKCS#12 bundle: {0}")]
    InvalidBundle(String),

    #[error("could not decrypt certificate bundle (wrong passphrase?): {0}")]
    BadPassphrase(String),

    #[error("certificate bundle contains no private key usable for signing")]
    NoSigningKey,

    #[error("certificate bundle contains no certificate")]
    NoCertificate,

    #[error("signature computation failed: {0}")]
    Signature(String),
}

/// A remote operation against the web service failed
///
/// `is_retryable` separates network-layer failures (worth retrying with
/// backoff) from explicit protocol-layer rejections (fatal to the run).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("endpoint rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("submission handle `{0}` is unknown to the remote service")]
    UnknownHandle(SubmissionHandle),

    #[error("results for `{0}` are not available yet")]
    ResultsNotReady(SubmissionHandle),

    #[error("could not interpret the service response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether the orchestrator may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. } | TransportError::Timeout { .. }
        )
    }
}

/// Run-level error produced by the orchestrator
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The polling budget ran out while the batch was still non-terminal.
    /// The batch may still complete remotely; the handle is preserved so a
    /// later run can query it again rather than resubmit.
    #[error("polling budget exhausted after {attempts} status checks; batch `{handle}` may still complete remotely")]
    PollingTimeout {
        handle: SubmissionHandle,
        attempts: u32,
    },
}
