//! Cached per-account risk state.
//!
//! The ledger collaborator is the source of truth for balances and
//! positions; it pushes [`LedgerSnapshot`]s. Between snapshots the cache
//! tracks what the engine told it: open orders, reserved notional, and
//! positions moved by fills.
//!
//! Accounts never seen in a snapshot start with a zero balance, so every
//! order from them fails the balance check.

use std::collections::HashMap;

use tapeline_types::{AccountLimits, LedgerSnapshot, Notional, OrderId, Price, Quantity, Side, Symbol};

use crate::rate_limiter::RateWindow;

/// Notional held for one open order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub symbol: Symbol,
    pub side: Side,
    /// Price the reservation was sized at.
    pub price: Price,
    /// Quantity not yet filled.
    pub open: Quantity,
}

impl Reservation {
    #[must_use]
    pub fn notional(&self) -> Notional {
        self.price.notional(self.open)
    }
}

#[derive(Debug, Clone)]
pub struct AccountState {
    pub balance: Notional,
    pub trading_enabled: bool,
    pub limits: Option<AccountLimits>,
    positions: HashMap<Symbol, i128>,
    reservations: HashMap<OrderId, Reservation>,
    reserved: Notional,
    pub(crate) rate: RateWindow,
}

impl AccountState {
    #[must_use]
    pub fn new(rate: RateWindow) -> Self {
        Self {
            balance: Notional::ZERO,
            trading_enabled: true,
            limits: None,
            positions: HashMap::new(),
            reservations: HashMap::new(),
            reserved: Notional::ZERO,
            rate,
        }
    }

    /// Overwrite the ledger-owned fields. Reservations and the rate window
    /// are engine-side and survive.
    pub fn apply_snapshot(&mut self, snapshot: &LedgerSnapshot) {
        self.balance = snapshot.balance;
        self.trading_enabled = snapshot.trading_enabled;
        self.limits = snapshot.limits;
        self.positions = snapshot
            .positions
            .iter()
            .map(|p| (p.symbol.clone(), p.lots))
            .collect();
    }

    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> i128 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn reserved(&self) -> Notional {
        self.reserved
    }

    #[must_use]
    pub fn open_orders(&self) -> usize {
        self.reservations.len()
    }

    #[must_use]
    pub fn reservation(&self, order_id: &OrderId) -> Option<&Reservation> {
        self.reservations.get(order_id)
    }

    /// Balance not held by open orders.
    #[must_use]
    pub fn available(&self) -> Notional {
        self.balance.saturating_sub(self.reserved)
    }

    pub fn reserve(&mut self, order_id: OrderId, reservation: Reservation) {
        self.reserved = self.reserved.saturating_add(reservation.notional());
        if let Some(old) = self.reservations.insert(order_id, reservation) {
            self.reserved = self.reserved.saturating_sub(old.notional());
        }
    }

    /// Drop the whole reservation of a finished order.
    pub fn release(&mut self, order_id: &OrderId) -> Option<Reservation> {
        let reservation = self.reservations.remove(order_id)?;
        self.reserved = self.reserved.saturating_sub(reservation.notional());
        Some(reservation)
    }

    /// Apply one fill: move the position, shrink the reservation, and move
    /// cash by the executed notional.
    pub fn fill(&mut self, order_id: &OrderId, symbol: &Symbol, side: Side, price: Price, qty: Quantity) {
        let lots = i128::from(qty.0);
        let position = self.positions.entry(symbol.clone()).or_insert(0);
        match side {
            Side::Buy => *position += lots,
            Side::Sell => *position -= lots,
        }

        if let Some(reservation) = self.reservations.get_mut(order_id) {
            let consumed = reservation.open.min(qty);
            self.reserved = self
                .reserved
                .saturating_sub(reservation.price.notional(consumed));
            reservation.open = reservation.open.saturating_sub(consumed);
        }

        let notional = price.notional(qty);
        self.balance = match side {
            Side::Buy => self.balance.saturating_sub(notional),
            Side::Sell => self.balance.saturating_add(notional),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountState {
        AccountState::new(RateWindow::new(1000, 10))
    }

    fn reservation(price: u64, open: u64) -> Reservation {
        Reservation {
            symbol: Symbol::new("BTC-USD"),
            side: Side::Buy,
            price: Price(price),
            open: Quantity(open),
        }
    }

    #[test]
    fn reserve_and_release() {
        let mut acct = account();
        acct.balance = Notional(10_000);
        let id = OrderId::new();
        acct.reserve(id, reservation(100, 10));
        assert_eq!(acct.reserved(), Notional(1_000));
        assert_eq!(acct.available(), Notional(9_000));
        assert_eq!(acct.open_orders(), 1);

        assert!(acct.release(&id).is_some());
        assert_eq!(acct.reserved(), Notional::ZERO);
        assert!(acct.release(&id).is_none());
    }

    #[test]
    fn fill_shrinks_reservation_and_moves_position() {
        let mut acct = account();
        acct.balance = Notional(10_000);
        let id = OrderId::new();
        let symbol = Symbol::new("BTC-USD");
        acct.reserve(id, reservation(100, 10));

        acct.fill(&id, &symbol, Side::Buy, Price(90), Quantity(4));
        assert_eq!(acct.position(&symbol), 4);
        assert_eq!(acct.reserved(), Notional(600));
        assert_eq!(acct.reservation(&id).unwrap().open, Quantity(6));
        assert_eq!(acct.balance, Notional(10_000 - 360));
    }

    #[test]
    fn snapshot_keeps_reservations() {
        let mut acct = account();
        let id = OrderId::new();
        acct.reserve(id, reservation(100, 10));
        let snapshot = LedgerSnapshot::funded(tapeline_types::AccountId::new(), Notional(5))
            .with_position(Symbol::new("BTC-USD"), -3);
        acct.apply_snapshot(&snapshot);
        assert_eq!(acct.balance, Notional(5));
        assert_eq!(acct.position(&Symbol::new("BTC-USD")), -3);
        assert_eq!(acct.reserved(), Notional(1_000));
    }
}
