//! # tapeline-engine
//!
//! **Async runtime hosting one matching engine per symbol.**
//!
//! - **Exchange**: front door; risk gate first, then routes to the symbol
//! - **SymbolActor**: tokio task that owns a `MatchingEngine` and serves
//!   intents one at a time from a bounded queue
//! - **AuditWriter**: per-symbol thread that appends and persists the
//!   audit records, publishes market data and feeds risk, then replies
//! - **MarketDataPublisher**: lossy broadcast fan-out with gap detection
//!
//! A caller learns of a trade only after its records are stored. When the
//! writer falls behind by `audit_watermark` intents, new intents are
//! answered `Busy` without touching the book.

mod actor;
pub mod command;
pub mod exchange;
pub mod market_data;
mod writer;

pub use command::{CancelReport, Committed, OcoReport, RecoveryReport, SubmitReport, SymbolStatus};
pub use exchange::{CancelRequest, Exchange};
pub use market_data::{Delivery, MarketData, MarketDataEvent, MarketDataPublisher, Subscription};
