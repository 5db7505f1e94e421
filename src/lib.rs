//! This crate implements the batch submission pipeline for NFSe service invoices (RPS).
//! It builds ABRASF-conformant batch documents from pending invoice records, signs them,
//! submits them to the municipal web service and polls until final invoice numbers are
//! issued or the batch is rejected.

pub mod types; // Defines the data model shared across the pipeline.
pub mod error; // Error taxonomy for each pipeline stage.
pub mod config; // Defines and loads system configuration.
pub mod source; // Invoice data source collaborator (pending records, reconciliation).
pub mod builder; // Builds the ABRASF batch XML from invoice records.
pub mod signer; // Applies the XML digital signature to batch documents.
pub mod transport; // Executes the remote operations against the web service.
pub mod orchestrator; // Drives the submission state machine end to end.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use error::{DispatchError, SigningError, TransportError, ValidationError};
pub use config::Config;
pub use orchestrator::BatchOrchestrator;
