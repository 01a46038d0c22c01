//! Trade types produced by the Tapeline matcher.
//!
//! A [`Trade`] is the immutable record of a fill between a taker and a maker
//! at the maker's resting price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Notional, OrderId, Price, Quantity, Side, Symbol, TradeId};

/// A single fill between a taker (aggressive) and maker (resting) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Deterministic from `symbol` + `sequence`.
    pub id: TradeId,
    pub symbol: Symbol,
    /// Per-symbol trade sequence, gapless from 1.
    pub sequence: u64,
    pub maker_order_id: OrderId,
    pub maker_account_id: AccountId,
    pub taker_order_id: OrderId,
    pub taker_account_id: AccountId,
    /// Which side the taker was on.
    pub taker_side: Side,
    /// Execution price (always the maker's resting price).
    pub price: Price,
    pub quantity: Quantity,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[must_use]
    pub fn notional(&self) -> Notional {
        self.price.notional(self.quantity)
    }

    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == Side::Buy
    }

    /// Account on the buying side of the trade.
    #[must_use]
    pub fn buyer(&self) -> AccountId {
        if self.taker_is_buyer() {
            self.taker_account_id
        } else {
            self.maker_account_id
        }
    }

    /// Account on the selling side of the trade.
    #[must_use]
    pub fn seller(&self) -> AccountId {
        if self.taker_is_buyer() {
            self.maker_account_id
        } else {
            self.taker_account_id
        }
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}#{}] {} {} @ {}",
            self.symbol, self.sequence, self.taker_side, self.quantity, self.price,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade() -> Trade {
        let symbol = Symbol::new("BTC-USD");
        Trade {
            id: TradeId::deterministic(&symbol, 1),
            symbol,
            sequence: 1,
            maker_order_id: OrderId::new(),
            maker_account_id: AccountId::from_u128(1),
            taker_order_id: OrderId::new(),
            taker_account_id: AccountId::from_u128(2),
            taker_side: Side::Buy,
            price: Price(10),
            quantity: Quantity(60),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_notional() {
        assert_eq!(make_trade().notional(), Notional(600));
    }

    #[test]
    fn buyer_and_seller() {
        let mut t = make_trade();
        assert_eq!(t.buyer(), AccountId::from_u128(2));
        assert_eq!(t.seller(), AccountId::from_u128(1));
        t.taker_side = Side::Sell;
        assert_eq!(t.buyer(), AccountId::from_u128(1));
    }

    #[test]
    fn trade_display() {
        let s = format!("{}", make_trade());
        assert!(s.contains("BTC-USD#1"));
        assert!(s.contains("60 @ 10"));
    }

    #[test]
    fn trade_serde_roundtrip() {
        let trade = make_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
    }
}
