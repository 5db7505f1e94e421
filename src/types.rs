use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One pending service invoice record (RPS) waiting for conversion into an NFSe
///
/// Immutable input to the document builder; owned by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Provider tax id (CNPJ), digits only
    pub provider_cnpj: String,
    /// Provider municipal registration number
    pub municipal_registration: String,
    /// RPS sequence number within the provider's series
    pub rps_number: u64,
    /// RPS series (e.g. "A1")
    pub rps_series: String,
    /// RPS type code (1 = regular RPS)
    pub rps_type: u8,
    /// Issue timestamp of the provisional invoice
    pub issue_date: NaiveDateTime,
    /// Free-form description of the rendered service
    pub description: String,
    /// Gross service amount
    pub service_amount: f64,
    /// ISS tax amount
    pub iss_amount: f64,
    /// ISS tax rate (fraction, e.g. 0.05)
    pub iss_rate: f64,
    /// Service item code from the national service list
    pub service_code: String,
    /// IBGE code of the municipality where the service was rendered
    pub municipality_code: String,
    /// Service taker (customer) the invoice is issued against
    pub taker: ServiceTaker,
}

/// Service taker identification and address, one per invoice record
///
/// The taker document is a CNPJ (14 digits) for companies or a CPF
/// (11 digits) for natural persons; the element emitted under
/// `IdentificacaoTomador` follows from its length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTaker {
    /// Taker tax id (CNPJ or CPF), digits only
    pub document: String,
    /// Legal name (razao social)
    pub legal_name: String,
    /// Street line of the taker address
    pub street: String,
    pub street_number: String,
    /// Neighborhood (bairro)
    pub district: String,
    /// IBGE code of the taker's municipality
    pub municipality_code: String,
    /// Two-letter state code (UF)
    pub state: String,
    /// Postal code (CEP), digits only
    pub postal_code: String,
}

/// Batch-level header: provider identity plus the batch sequence number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHeader {
    pub provider_cnpj: String,
    pub municipal_registration: String,
    pub municipality_code: String,
    pub batch_number: u64,
}

/// An ABRASF batch document built from a set of invoice records
///
/// The XML is rendered once at construction and never mutated afterwards;
/// the signer only appends a signature block to a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDocument {
    pub batch_number: u64,
    pub record_count: usize,
    /// `Id` attribute of the `LoteRps` element, referenced by the signature
    pub lote_id: String,
    /// Serialized `EnviarLoteRpsEnvio` document
    pub xml: String,
}

/// Whether a document carries a real signature or was passed through unsigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureMode {
    /// A digital signature block was embedded
    Signed,
    /// Signature explicitly disabled; document forwarded unsigned (development only)
    Passthrough,
}

impl std::fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureMode::Signed => write!(f, "signed"),
            SignatureMode::Passthrough => write!(f, "pass-through"),
        }
    }
}

/// A batch document plus the signature block bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct SignedDocument {
    pub xml: String,
    pub mode: SignatureMode,
}

/// Opaque protocol identifier returned by the web service on submission
///
/// The sole key for all subsequent status and result queries. Once a handle
/// exists the batch must never be resubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionHandle(pub String);

impl std::fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of a submitted batch, as reported by the web service
///
/// Wire codes are the ABRASF integers 1-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Unreceived,
    Processing,
    Error,
    Processed,
}

impl BatchStatus {
    /// Map the wire status code (1-4) to a status, if known
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(BatchStatus::Unreceived),
            2 => Some(BatchStatus::Processing),
            3 => Some(BatchStatus::Error),
            4 => Some(BatchStatus::Processed),
            _ => None,
        }
    }

    /// The wire status code for this status
    pub fn code(&self) -> u32 {
        match self {
            BatchStatus::Unreceived => 1,
            BatchStatus::Processing => 2,
            BatchStatus::Error => 3,
            BatchStatus::Processed => 4,
        }
    }

    /// Human-readable description used in logs and reports
    pub fn description(&self) -> &'static str {
        match self {
            BatchStatus::Unreceived => "batch not yet received",
            BatchStatus::Processing => "batch is being processed",
            BatchStatus::Error => "batch processed with errors",
            BatchStatus::Processed => "batch processed successfully",
        }
    }

    /// Terminal statuses end the polling loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Error | BatchStatus::Processed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Status plus the description string reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: BatchStatus,
    pub description: String,
}

impl StatusReply {
    pub fn new(status: BatchStatus) -> Self {
        Self {
            status,
            description: status.description().to_string(),
        }
    }
}

/// An official invoice issued for one record of the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedInvoice {
    /// Index of the originating record within the submitted batch
    pub record_index: usize,
    /// Official NFSe number assigned by the authority
    pub invoice_number: String,
    /// Verification code printed on the invoice, when returned
    pub verification_code: Option<String>,
    /// Issue timestamp reported by the authority, when returned
    pub issued_at: Option<String>,
}

/// A per-record rejection reason reported by the authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRejection {
    /// Index of the rejected record, when the authority identifies one
    pub record_index: Option<usize>,
    /// Authority error code (e.g. "E160")
    pub code: String,
    pub message: String,
}

/// Final outcome of the result-fetch call for a terminal batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchResults {
    /// Invoice numbers in batch record order
    Issued(Vec<IssuedInvoice>),
    /// Rejection reasons reported through the same channel
    Rejected(Vec<RecordRejection>),
}

/// Pipeline stages, in execution order
///
/// A stage appears in the outcome report only once it has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Building,
    Signing,
    Submitting,
    Polling,
    Fetching,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Building => "building",
            Stage::Signing => "signing",
            Stage::Submitting => "submitting",
            Stage::Polling => "polling",
            Stage::Fetching => "fetching",
        };
        write!(f, "{}", name)
    }
}

/// Structured result of one orchestrator run
///
/// This is the sole programmatic return value of a run. The handle is
/// recorded as soon as submission succeeds so that a failed run can still
/// be re-queried later instead of resubmitted.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub success: bool,
    pub handle: Option<SubmissionHandle>,
    pub duration: Duration,
    pub completed_stages: Vec<Stage>,
    pub signature_mode: SignatureMode,
    pub invoices: Vec<IssuedInvoice>,
    pub errors: Vec<String>,
}

impl OutcomeReport {
    /// Create an empty report for a run that has just started
    pub fn new(signature_mode: SignatureMode) -> Self {
        Self {
            success: false,
            handle: None,
            duration: Duration::ZERO,
            completed_stages: Vec::new(),
            signature_mode,
            invoices: Vec::new(),
            errors: Vec::new(),
        }
    }
}
