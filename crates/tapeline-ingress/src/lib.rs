//! # tapeline-ingress
//!
//! **Pre-trade risk gate**: every order passes through here before it
//! reaches a symbol actor.
//!
//! ## Architecture
//!
//! 1. **RiskValidator**: hard gate, checks and reserves atomically per account
//! 2. **AccountState**: cached balance, positions, reservations per account
//! 3. **RateWindow**: sliding-window submission limit per account
//!
//! ## Order Flow
//!
//! ```text
//! OrderRequest → RiskValidator.validate() → symbol actor → engine events
//!     → RiskValidator.on_fill() / on_order_update() release reservations
//! ```

pub mod account_book;
pub mod rate_limiter;
pub mod risk_validator;

pub use account_book::{AccountState, Reservation};
pub use rate_limiter::RateWindow;
pub use risk_validator::RiskValidator;
