//! Tenant Ledger
//!
//! Tamper-evident, append-only log of every mutating business operation,
//! hash-chained per tenant and periodically re-verified.

pub mod entry;
pub mod hasher;
pub mod memory;
pub mod payload;
pub mod recorder;
pub mod store;
pub mod sweep;
pub mod verify;

pub use entry::{ActorContext, LedgerEntry, OPERATION_CREATE, OPERATION_DELETE, OPERATION_UPDATE};
pub use hasher::{ChainHasher, HashInput};
pub use memory::MemoryLedger;
pub use payload::{FieldValue, FileUpload, RecordPayload};
pub use recorder::{Ledger, RecordFailurePolicy};
pub use store::{LedgerBackend, ScannedEntry};
pub use sweep::{AuditSweep, SweepOutcome, SweepReport, TenantReport};
pub use verify::{ChainVerification, ChainVerifier, CorruptionKind, VerifyMode};
