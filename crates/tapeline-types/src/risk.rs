//! Risk model shared between the pre-trade gate and the ledger collaborator.
//!
//! ```text
//! OrderRequest
//!   → RiskValidator.validate(order, now)
//!     → trading enabled?
//!     → rate limit
//!     → shape, size bounds, tick multiple
//!     → price collar around the reference price
//!     → open-order and position limits
//!     → balance (reserved + notional ≤ ledger balance)
//!     → IF ALL PASS → reserve, forward to the symbol actor
//!     → IF ANY FAIL → Rejected { reason }, audit record, no book change
//! ```

use serde::{Deserialize, Serialize};

use crate::{AccountId, Notional, RejectReason, Symbol};

/// Outcome of a pre-trade risk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskDecision {
    Approved,
    Rejected { reason: RejectReason },
}

impl RiskDecision {
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    #[must_use]
    pub const fn reject_reason(self) -> Option<RejectReason> {
        match self {
            Self::Approved => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// Per-account limit overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLimits {
    pub max_open_orders: usize,
    /// Maximum absolute position per symbol, in lots.
    pub max_position: u64,
}

/// Signed position in lots for one symbol. Positive is long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub lots: i128,
}

/// Authoritative account state pushed by the ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub account_id: AccountId,
    /// Spendable balance in ticks × lots.
    pub balance: Notional,
    pub positions: Vec<PositionSnapshot>,
    pub trading_enabled: bool,
    /// `None` keeps the configured defaults.
    pub limits: Option<AccountLimits>,
}

impl LedgerSnapshot {
    /// An enabled account with a balance and no positions.
    #[must_use]
    pub fn funded(account_id: AccountId, balance: Notional) -> Self {
        Self {
            account_id,
            balance,
            positions: Vec::new(),
            trading_enabled: true,
            limits: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, symbol: Symbol, lots: i128) -> Self {
        self.positions.push(PositionSnapshot { symbol, lots });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_accessors() {
        assert!(RiskDecision::Approved.is_approved());
        let rejected = RiskDecision::Rejected {
            reason: RejectReason::PriceCollar,
        };
        assert!(!rejected.is_approved());
        assert_eq!(rejected.reject_reason(), Some(RejectReason::PriceCollar));
    }

    #[test]
    fn funded_snapshot_is_enabled() {
        let snap = LedgerSnapshot::funded(AccountId::from_u128(7), Notional(1_000))
            .with_position(Symbol::new("BTC-USD"), -5);
        assert!(snap.trading_enabled);
        assert_eq!(snap.positions[0].lots, -5);
    }
}
