//! Batch Orchestrator Module
//!
//! Drives the submission state machine end to end, from `Building` through
//! `Signing`, `Submitting`, `Polling` and `Fetching` into `Completed` or
//! `Failed`. Builder and signer failures are deterministic and fatal;
//! transport failures are retried with bounded backoff; the polling loop
//! enforces both an attempt ceiling and a wall-clock budget.

mod dispatch;


pub use dispatch::BatchOrchestrator;
