//! # tapeline-matchcore
//!
//! **Pure deterministic matching core for Tapeline.**
//!
//! One [`MatchingEngine`] owns the book of one symbol. It takes intents
//! with an explicit timestamp and returns the events they caused. It has:
//!
//! - **Zero side effects**: no I/O, no clock, no balance or risk logic
//! - **Deterministic output**: same intents and timestamps -> same events
//! - **Price-time priority**: best price first, FIFO within a level
//! - **Order types**: limit, market, stop, iceberg, OCO; IOC / FOK / GTD / post-only
//! - **Circuit breaker**: marketable intake halts on excessive price moves

pub mod breaker;
pub mod determinism;
pub mod engine;
pub mod expiry;
pub mod orderbook;
pub mod price_level;
pub mod stops;
pub mod terminal;

pub use breaker::{BreakerState, CircuitBreaker, Trip};
pub use determinism::{book_digest, compute_trade_root, digest_hex, verify_trade_root};
pub use engine::{MatchingEngine, Outcome};
pub use orderbook::{BookSnapshot, DepthLevel, OrderBook};
pub use price_level::PriceLevel;
pub use stops::StopBook;
