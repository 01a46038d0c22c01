//! # tapeline-types
//!
//! Shared types, errors, and configuration for the **Tapeline** matching engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`AccountId`], [`ClientOrderId`], [`TradeId`], [`Symbol`]
//! - **Fixed-point numerics**: [`Price`] (ticks), [`Quantity`] (lots), [`Notional`]
//! - **Order model**: [`Order`], [`OrderRequest`], [`Side`], [`OrderType`], [`TimeInForce`], [`OrderStatus`]
//! - **Trade model**: [`Trade`]
//! - **Events**: [`EngineEvent`], [`AuditEvent`], [`OrderUpdate`], [`BookDelta`], [`RejectReason`], [`CancelReason`]
//! - **Risk model**: [`RiskDecision`], [`LedgerSnapshot`], [`AccountLimits`]
//! - **Configuration**: [`ExchangeConfig`], [`SymbolConfig`], [`BreakerConfig`], [`RiskConfig`], [`RuntimeConfig`]
//! - **Errors**: [`TapelineError`] with `TL_ERR_` prefix codes

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod numeric;
pub mod order;
pub mod risk;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use tapeline_types::{Order, Side, Trade, Price, ...};

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use numeric::*;
pub use order::*;
pub use risk::*;
pub use trade::*;

// Constants are accessed via `tapeline_types::constants::FOO`
// (not re-exported to avoid name collisions).
