//! # tapeline-audit
//!
//! **Tamper-evident audit trail for Tapeline.**
//!
//! Every accepted input and every state change it caused is appended to a
//! per-symbol log whose records are chained by SHA-256:
//!
//! - **AuditRecord**: one link; `hash` covers sequence, predecessor and payload
//! - **AuditLog**: append-only arena with `verify_chain`
//! - **AuditStore**: `MemoryStore` and `JsonLinesStore` persistence
//! - **replay**: rebuild a symbol's engine from its log and prove it matches

pub mod log;
pub mod record;
pub mod replay;
pub mod store;

pub use log::AuditLog;
pub use record::{AuditRecord, GENESIS_HASH, chain_hash, payload_hash, verify_records};
pub use replay::{ReplayOutcome, apply_input, replay};
pub use store::{AuditStore, JsonLinesStore, MemoryStore};
