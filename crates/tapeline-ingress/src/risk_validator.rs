//! Risk validator: hard pre-trade gate in front of every symbol actor.
//!
//! ## Design Principles
//!
//! - **Fail-closed**: anything that cannot be checked is rejected
//! - **Check and reserve atomically**: the account entry stays locked from
//!   the first check to the reservation, so two symbol actors can never
//!   both spend the same balance
//! - **Never touches the book**: all state is cached per account and per
//!   symbol; the engine's event stream keeps it current
//!
//! Account state lives in a [`DashMap`], so accounts lock independently and
//! one validator is shared by every symbol.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tapeline_types::{
    AccountId, LedgerSnapshot, Order, OrderType, OrderUpdate, Price, RejectReason, RiskConfig, RiskDecision,
    Side, Symbol, SymbolConfig, Trade,
};
use tracing::{debug, warn};

use crate::account_book::{AccountState, Reservation};
use crate::rate_limiter::RateWindow;

pub struct RiskValidator {
    config: RiskConfig,
    symbols: HashMap<Symbol, SymbolConfig>,
    accounts: DashMap<AccountId, AccountState>,
    /// Last trade or external reference per symbol.
    references: DashMap<Symbol, Price>,
}

impl RiskValidator {
    #[must_use]
    pub fn new(config: RiskConfig, symbols: impl IntoIterator<Item = SymbolConfig>) -> Self {
        Self {
            config,
            symbols: symbols
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
            accounts: DashMap::new(),
            references: DashMap::new(),
        }
    }

    /// Check one order and, when approved, reserve its notional and an
    /// open-order slot.
    pub fn validate(&self, order: &Order, now: DateTime<Utc>) -> RiskDecision {
        let mut account = self
            .accounts
            .entry(order.account_id)
            .or_insert_with(|| self.fresh_account());

        match self.check(&mut account, order, now) {
            Ok(reservation) => {
                debug!(
                    account = %order.account_id,
                    order_id = %order.id,
                    notional = %reservation.notional(),
                    "risk approved"
                );
                account.reserve(order.id, reservation);
                RiskDecision::Approved
            }
            Err(reason) => {
                warn!(account = %order.account_id, order_id = %order.id, %reason, "risk rejected");
                RiskDecision::Rejected { reason }
            }
        }
    }

    /// Check both legs of an OCO pair. Either both are reserved or neither.
    pub fn validate_oco(&self, first: &Order, second: &Order, now: DateTime<Utc>) -> RiskDecision {
        if first.account_id != second.account_id {
            warn!(first = %first.id, second = %second.id, "oco legs from different accounts");
            return RiskDecision::Rejected {
                reason: RejectReason::InvalidOco,
            };
        }
        let decision = self.validate(first, now);
        if !decision.is_approved() {
            return decision;
        }
        let decision = self.validate(second, now);
        if !decision.is_approved() {
            self.release(first);
        }
        decision
    }

    /// Drop whatever is still reserved for `order`. Used when an approved
    /// order never reached the engine.
    pub fn release(&self, order: &Order) {
        if let Some(mut account) = self.accounts.get_mut(&order.account_id) {
            account.release(&order.id);
        }
    }

    /// Engine feedback: a terminal order frees its slot and the rest of
    /// its reservation.
    pub fn on_order_update(&self, update: &OrderUpdate) {
        if !update.status.is_terminal() {
            return;
        }
        if let Some(mut account) = self.accounts.get_mut(&update.account_id) {
            if account.release(&update.order_id).is_some() {
                debug!(account = %update.account_id, order_id = %update.order_id, status = %update.status, "reservation released");
            }
        }
    }

    /// Engine feedback: a fill moves both positions and the reference price.
    pub fn on_fill(&self, trade: &Trade) {
        let maker_side = trade.taker_side.opposite();
        for (account_id, order_id, side) in [
            (trade.taker_account_id, trade.taker_order_id, trade.taker_side),
            (trade.maker_account_id, trade.maker_order_id, maker_side),
        ] {
            let mut account = self
                .accounts
                .entry(account_id)
                .or_insert_with(|| self.fresh_account());
            account.fill(&order_id, &trade.symbol, side, trade.price, trade.quantity);
        }
        self.references.insert(trade.symbol.clone(), trade.price);
    }

    pub fn on_reference_price(&self, symbol: &Symbol, price: Price) {
        self.references.insert(symbol.clone(), price);
    }

    /// Replace the ledger-owned part of an account's state.
    pub fn apply_ledger_snapshot(&self, snapshot: &LedgerSnapshot) {
        debug!(account = %snapshot.account_id, balance = %snapshot.balance, "ledger snapshot");
        self.accounts
            .entry(snapshot.account_id)
            .or_insert_with(|| self.fresh_account())
            .apply_snapshot(snapshot);
    }

    #[must_use]
    pub fn reference_price(&self, symbol: &Symbol) -> Option<Price> {
        self.references.get(symbol).map(|p| *p)
    }

    /// Copy of an account's cached state.
    #[must_use]
    pub fn account(&self, account_id: &AccountId) -> Option<AccountState> {
        self.accounts.get(account_id).map(|a| a.clone())
    }

    fn fresh_account(&self) -> AccountState {
        AccountState::new(RateWindow::new(
            self.config.rate_limit_window_ms,
            self.config.rate_limit_count,
        ))
    }

    fn check(
        &self,
        account: &mut AccountState,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<Reservation, RejectReason> {
        let rules = self
            .symbols
            .get(&order.symbol)
            .ok_or(RejectReason::SymbolMismatch)?;

        if !account.trading_enabled {
            return Err(RejectReason::TradingDisabled);
        }
        if !account.rate.check_and_record(now) {
            return Err(RejectReason::RateLimited);
        }

        check_shape(order)?;
        if order.quantity < rules.min_quantity {
            return Err(RejectReason::BelowMinSize);
        }
        if order.quantity > rules.max_quantity {
            return Err(RejectReason::AboveMaxSize);
        }
        for price in [order.price, order.stop_trigger()].into_iter().flatten() {
            if !price.is_multiple_of(rules.price_increment) {
                return Err(RejectReason::OffTick);
            }
        }

        let reference = self.reference_price(&order.symbol);
        if let (Some(price), Some(reference)) = (order.price, reference) {
            let outside = price
                .deviation_from(reference)
                .is_some_and(|deviation| deviation > self.config.price_collar);
            if outside {
                return Err(RejectReason::PriceCollar);
            }
        }

        let limits = account.limits;
        let max_open = limits.map_or(self.config.max_open_orders, |l| l.max_open_orders);
        if account.open_orders() >= max_open {
            return Err(RejectReason::OpenOrderLimit);
        }

        let max_position = i128::from(limits.map_or(self.config.max_position, |l| l.max_position));
        let lots = i128::from(order.quantity.0);
        let projected = match order.side {
            Side::Buy => account.position(&order.symbol) + lots,
            Side::Sell => account.position(&order.symbol) - lots,
        };
        if projected.abs() > max_position {
            return Err(RejectReason::PositionLimit);
        }

        let price = order
            .reserve_price()
            .or(reference)
            .ok_or(RejectReason::NotionalUnknown)?;
        let reservation = Reservation {
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            open: order.quantity,
        };
        if account.reserved().saturating_add(reservation.notional()) > account.balance {
            return Err(RejectReason::InsufficientBalance);
        }
        Ok(reservation)
    }
}

fn check_shape(order: &Order) -> Result<(), RejectReason> {
    if order.quantity.is_zero() {
        return Err(RejectReason::InvalidQuantity);
    }
    match order.order_type {
        OrderType::Limit | OrderType::Iceberg { .. } if order.price.is_none() => {
            return Err(RejectReason::MissingPrice);
        }
        OrderType::Iceberg { display } if display.is_zero() || display > order.quantity => {
            return Err(RejectReason::InvalidDisplaySize);
        }
        OrderType::Stop { trigger } if trigger.is_zero() => return Err(RejectReason::MissingPrice),
        _ => {}
    }
    if order.price.is_some_and(Price::is_zero) {
        return Err(RejectReason::MissingPrice);
    }
    Ok(())
}
