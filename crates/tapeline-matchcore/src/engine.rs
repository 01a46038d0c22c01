//! Price-time priority matching engine for one symbol.
//!
//! The engine is a synchronous state machine. It never reads a clock,
//! performs I/O or draws randomness: every intent carries its `now`, so
//! feeding the same intents with the same timestamps into a fresh engine
//! reproduces the same events bit for bit. That property is what makes
//! the audit log replayable.
//!
//! # Intent pipeline
//!
//! ```text
//! intent(now)
//!   → resume the breaker if the cool-down passed
//!   → expire due good-till-date orders
//!   → the intent itself (submit / OCO / cancel / reference price)
//!   → fire pending stops, earliest arrival first, until none fire
//!   → cancel siblings of OCO legs that completed
//!   → check the book is not crossed
//! ```
//!
//! Any invariant violation faults the symbol. A faulted engine rejects
//! every further intent with `SymbolFaulted`; recovery is a replay of the
//! audit log into a fresh engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tapeline_types::*;
use tracing::{debug, error, info, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::expiry::ExpiryQueue;
use crate::orderbook::{BookSnapshot, OrderBook};
use crate::stops::{self, StopBook};
use crate::terminal::TerminalCache;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Everything one intent produced, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub events: Vec<EngineEvent>,
    /// Displayed level changes, one per touched level.
    pub deltas: Vec<BookDelta>,
}

impl Outcome {
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.events.iter().filter_map(EngineEvent::as_trade)
    }

    /// Last state change reported for `order_id` in this intent.
    #[must_use]
    pub fn final_update(&self, order_id: OrderId) -> Option<&OrderUpdate> {
        self.events.iter().rev().find_map(|event| match event {
            EngineEvent::OrderUpdated(update) if update.order_id == order_id => Some(update),
            _ => None,
        })
    }

    /// Why a cancel intent was refused, if it was.
    #[must_use]
    pub fn cancel_rejection(&self) -> Option<RejectReason> {
        self.events.iter().find_map(|event| match event {
            EngineEvent::CancelRejected { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.deltas.is_empty()
    }
}

/// Scratch state for the intent being processed.
struct Intent {
    now: DateTime<Utc>,
    events: Vec<EngineEvent>,
    touched: Vec<(Side, Price)>,
    /// OCO siblings waiting to be cancelled.
    siblings: Vec<OrderId>,
}

impl Intent {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            events: Vec::new(),
            touched: Vec::new(),
            siblings: Vec::new(),
        }
    }

    fn touch(&mut self, side: Side, price: Price) {
        if !self.touched.contains(&(side, price)) {
            self.touched.push((side, price));
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MatchingEngine {
    config: SymbolConfig,
    book: OrderBook,
    stops: StopBook,
    breaker: CircuitBreaker,
    expiry: ExpiryQueue,
    terminal: TerminalCache,
    /// Live orders by `(account, client id)`.
    clients: HashMap<(AccountId, ClientOrderId), OrderId>,
    /// OCO links between live legs, both directions.
    links: HashMap<OrderId, OrderId>,
    last_trade_price: Option<Price>,
    /// Last trade or external reference, whichever came last. Drives stops.
    last_price: Option<Price>,
    next_arrival: u64,
    trade_sequence: u64,
    fault: Option<String>,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(config: SymbolConfig) -> Self {
        Self {
            book: OrderBook::new(config.symbol.clone()),
            stops: StopBook::new(),
            breaker: CircuitBreaker::new(config.breaker.clone()),
            expiry: ExpiryQueue::new(),
            terminal: TerminalCache::new(config.terminal_cache_size),
            clients: HashMap::new(),
            links: HashMap::new(),
            last_trade_price: None,
            last_price: None,
            next_arrival: 0,
            trade_sequence: 0,
            fault: None,
            config,
        }
    }

    // =================================================================
    // Intents
    // =================================================================

    /// Submit one order. Stops park until triggered.
    pub fn submit(&mut self, order: Order, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        self.ensure_unknown(order.id)?;
        debug!(symbol = %self.config.symbol, order_id = %order.id, kind = %order.order_type, "submit");

        let mut intent = Intent::new(now);
        let result = self.run_submit(order, &mut intent);
        self.conclude(result, intent)
    }

    /// Submit two linked legs; whichever completes first cancels the other.
    pub fn submit_oco(&mut self, first: Order, second: Order, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        self.ensure_unknown(first.id)?;
        self.ensure_unknown(second.id)?;
        if first.id == second.id {
            return Err(TapelineError::DuplicateOrder(second.id));
        }
        debug!(symbol = %self.config.symbol, first = %first.id, second = %second.id, "submit oco");

        let mut intent = Intent::new(now);
        let result = self.run_oco(first, second, &mut intent);
        self.conclude(result, intent)
    }

    /// Cancel a live order. A terminal target yields a `CancelRejected`
    /// event with `AlreadyTerminal` and changes nothing.
    pub fn cancel(&mut self, target: CancelTarget, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        debug!(symbol = %self.config.symbol, %target, "cancel");

        let mut intent = Intent::new(now);
        let result = self.run_cancel(target, &mut intent);
        self.conclude(result, intent)
    }

    /// External reference price. May fire stops and seeds the breaker.
    pub fn update_reference_price(&mut self, price: Price, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        debug!(symbol = %self.config.symbol, %price, "reference price");

        let mut intent = Intent::new(now);
        let result = self.run_reference(price, &mut intent);
        self.conclude(result, intent)
    }

    /// Lift a circuit-breaker halt before its cool-down ends. Emits
    /// `Resumed` when the breaker was halted; otherwise changes nothing.
    pub fn resume_trading(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        debug!(symbol = %self.config.symbol, "resume requested");

        let mut intent = Intent::new(now);
        let result = self.run_resume(&mut intent);
        self.conclude(result, intent)
    }

    /// Expire every good-till-date order due at `now`. Runs at the start of
    /// every intent as well.
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        self.ensure_live()?;
        let mut intent = Intent::new(now);
        let result = self.begin(&mut intent).and_then(|()| self.complete(&mut intent));
        self.conclude(result, intent)
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.config.symbol
    }

    #[must_use]
    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    #[must_use]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.book.best_bid()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.book.best_ask()
    }

    #[must_use]
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            symbol: self.config.symbol.clone(),
            bids: self.book.depth(Side::Buy, depth),
            asks: self.book.depth(Side::Sell, depth),
            last_trade_price: self.last_trade_price,
            halted: self.breaker.is_halted(),
        }
    }

    /// A live order, resting or waiting for its trigger.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.book.get(order_id).or_else(|| self.stops.get(order_id))
    }

    /// Status of an order the engine still remembers.
    #[must_use]
    pub fn order_status(&self, order_id: &OrderId) -> Option<OrderStatus> {
        self.order(order_id)
            .map(|o| o.status)
            .or_else(|| self.terminal.status(order_id))
    }

    #[must_use]
    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    #[must_use]
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    #[must_use]
    pub fn fault_reason(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    #[must_use]
    pub fn pending_stops(&self) -> usize {
        self.stops.len()
    }

    #[must_use]
    pub fn trade_sequence(&self) -> u64 {
        self.trade_sequence
    }

    // =================================================================
    // Intent bodies
    // =================================================================

    fn run_submit(&mut self, order: Order, intent: &mut Intent) -> Result<()> {
        self.begin(intent)?;
        if order.linked_order.is_some() {
            let order = self.stamp(order, intent.now);
            self.reject(order, RejectReason::InvalidOco, intent);
        } else {
            self.accept(order, intent)?;
        }
        self.complete(intent)
    }

    fn run_oco(&mut self, mut first: Order, mut second: Order, intent: &mut Intent) -> Result<()> {
        self.begin(intent)?;

        if let Some(reason) = self.validate_oco(&first, &second) {
            for leg in [first, second] {
                let leg = self.stamp(leg, intent.now);
                self.reject(leg, reason, intent);
            }
            return self.complete(intent);
        }

        first.linked_order = Some(second.id);
        second.linked_order = Some(first.id);
        self.links.insert(first.id, second.id);
        self.links.insert(second.id, first.id);

        self.accept(first, intent)?;
        self.settle_links(intent)?;

        if self.links.contains_key(&second.id) {
            self.accept(second, intent)?;
        } else {
            // The first leg already completed.
            let mut second = self.stamp(second, intent.now);
            second.status = OrderStatus::Cancelled;
            self.emit_update(&second, Some(StatusReason::Cancelled(CancelReason::OcoSiblingDone)), intent);
        }
        self.complete(intent)
    }

    fn run_cancel(&mut self, target: CancelTarget, intent: &mut Intent) -> Result<()> {
        self.begin(intent)?;

        let resolved = match &target {
            CancelTarget::Order(id) => Some(*id),
            CancelTarget::Client {
                account_id,
                client_order_id,
            } => self
                .clients
                .get(&(*account_id, client_order_id.clone()))
                .copied()
                .or_else(|| self.terminal.lookup_client(*account_id, client_order_id)),
        };

        match resolved {
            Some(id) => {
                if let Some(mut order) = self.take_live(&id, intent)? {
                    order.status = OrderStatus::Cancelled;
                    order.updated_at = intent.now;
                    self.emit_update(&order, Some(StatusReason::Cancelled(CancelReason::UserRequested)), intent);
                } else {
                    let reason = if self.terminal.contains(&id) {
                        RejectReason::AlreadyTerminal
                    } else {
                        RejectReason::UnknownOrder
                    };
                    self.refuse_cancel(target, reason, intent);
                }
            }
            None => self.refuse_cancel(target, RejectReason::UnknownOrder, intent),
        }
        self.complete(intent)
    }

    fn run_reference(&mut self, price: Price, intent: &mut Intent) -> Result<()> {
        self.begin(intent)?;
        self.last_price = Some(price);
        self.breaker.set_reference(price);
        self.complete(intent)
    }

    fn run_resume(&mut self, intent: &mut Intent) -> Result<()> {
        self.begin(intent)?;
        if self.breaker.resume() {
            info!(symbol = %self.config.symbol, at = %intent.now, "circuit breaker resumed by operator");
            intent.events.push(EngineEvent::Resumed { at: intent.now });
        }
        self.complete(intent)
    }

    fn refuse_cancel(&mut self, target: CancelTarget, reason: RejectReason, intent: &mut Intent) {
        debug!(symbol = %self.config.symbol, %target, %reason, "cancel refused");
        intent.events.push(EngineEvent::CancelRejected {
            target,
            reason,
            at: intent.now,
        });
    }

    // =================================================================
    // Pipeline stages
    // =================================================================

    /// Breaker resume and GTD sweep, ahead of every intent.
    fn begin(&mut self, intent: &mut Intent) -> Result<()> {
        if self.breaker.poll(intent.now) {
            info!(symbol = %self.config.symbol, at = %intent.now, "circuit breaker resumed");
            intent.events.push(EngineEvent::Resumed { at: intent.now });
        }

        for id in self.expiry.pop_due(intent.now) {
            if let Some(mut order) = self.take_live(&id, intent)? {
                order.status = OrderStatus::Expired;
                order.updated_at = intent.now;
                self.emit_update(&order, Some(StatusReason::Cancelled(CancelReason::Expired)), intent);
            }
        }
        self.settle_links(intent)
    }

    /// Stop cascade, OCO settlement and the crossed-book check.
    fn complete(&mut self, intent: &mut Intent) -> Result<()> {
        self.settle_links(intent)?;
        while let Some(price) = self.last_price {
            let Some(stop) = self.stops.pop_triggered(price) else {
                break;
            };
            self.fire_stop(stop, price, intent)?;
            self.settle_links(intent)?;
        }

        if self.book.is_crossed() {
            return Err(self.violation(format!(
                "book crossed after matching: bid {:?} >= ask {:?}",
                self.book.best_bid(),
                self.book.best_ask()
            )));
        }
        Ok(())
    }

    fn conclude(&mut self, result: Result<()>, intent: Intent) -> Result<Outcome> {
        match result {
            Ok(()) => {
                let deltas = intent
                    .touched
                    .iter()
                    .map(|&(side, price)| BookDelta {
                        side,
                        price,
                        quantity: self.book.level_quantity(side, price),
                    })
                    .collect();
                Ok(Outcome {
                    events: intent.events,
                    deltas,
                })
            }
            Err(err) => {
                if err.is_fatal() && self.fault.is_none() {
                    error!(symbol = %self.config.symbol, error = %err, "symbol faulted");
                    self.fault = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    // =================================================================
    // Order intake
    // =================================================================

    fn accept(&mut self, order: Order, intent: &mut Intent) -> Result<()> {
        let mut order = self.stamp(order, intent.now);

        if let Some(reason) = self.validate_shape(&order, intent.now) {
            self.reject(order, reason, intent);
            return Ok(());
        }
        if let Some(cid) = &order.client_order_id {
            let key = (order.account_id, cid.clone());
            if self.clients.contains_key(&key) {
                self.reject(order, RejectReason::DuplicateClientOrderId, intent);
                return Ok(());
            }
            self.clients.insert(key, order.id);
        }

        if let OrderType::Stop { trigger } = order.order_type {
            if let Some(last) = self.last_price {
                if stops::is_triggered(order.side, trigger, last) {
                    return self.fire_stop(order, last, intent);
                }
            }
            order.status = OrderStatus::PendingTrigger;
            if let TimeInForce::GoodTillDate(expires_at) = order.time_in_force {
                self.expiry.insert(order.id, expires_at, order.arrival);
            }
            self.emit_update(&order, None, intent);
            if let Err(order) = self.stops.insert(order) {
                return Err(self.violation(format!("order {} lost its trigger", order.id)));
            }
            return Ok(());
        }

        self.execute(order, intent)
    }

    /// Assign arrival sequence and reset lifecycle fields.
    fn stamp(&mut self, mut order: Order, now: DateTime<Utc>) -> Order {
        order.arrival = self.next_arrival;
        self.next_arrival += 1;
        order.status = OrderStatus::New;
        order.updated_at = now;
        order
    }

    fn validate_shape(&self, order: &Order, now: DateTime<Utc>) -> Option<RejectReason> {
        if order.symbol != self.config.symbol {
            return Some(RejectReason::SymbolMismatch);
        }
        if order.quantity.is_zero() || order.open_quantity() != order.quantity {
            return Some(RejectReason::InvalidQuantity);
        }
        match order.order_type {
            OrderType::Limit | OrderType::Iceberg { .. } if order.price.is_none() => {
                return Some(RejectReason::MissingPrice);
            }
            OrderType::Iceberg { display } if display.is_zero() || display > order.quantity => {
                return Some(RejectReason::InvalidDisplaySize);
            }
            OrderType::Market if order.post_only => return Some(RejectReason::MissingPrice),
            _ => {}
        }
        if let TimeInForce::GoodTillDate(expires_at) = order.time_in_force {
            if expires_at <= now {
                return Some(RejectReason::AlreadyExpired);
            }
        }
        None
    }

    fn validate_oco(&self, first: &Order, second: &Order) -> Option<RejectReason> {
        let leg_ok = |o: &Order| {
            matches!(o.order_type, OrderType::Limit | OrderType::Stop { .. })
                && o.time_in_force.allows_resting()
                && o.linked_order.is_none()
        };
        if first.account_id != second.account_id || !leg_ok(first) || !leg_ok(second) {
            return Some(RejectReason::InvalidOco);
        }
        if first.symbol != self.config.symbol || second.symbol != self.config.symbol {
            return Some(RejectReason::SymbolMismatch);
        }
        // Two resting limit legs that cross each other would self-match.
        if let (OrderType::Limit, OrderType::Limit, Some(p1), Some(p2)) =
            (first.order_type, second.order_type, first.price, second.price)
        {
            let crossing = match (first.side, second.side) {
                (Side::Buy, Side::Sell) => p1 >= p2,
                (Side::Sell, Side::Buy) => p2 >= p1,
                _ => false,
            };
            if crossing {
                return Some(RejectReason::InvalidOco);
            }
        }
        None
    }

    fn reject(&mut self, mut order: Order, reason: RejectReason, intent: &mut Intent) {
        warn!(symbol = %self.config.symbol, order_id = %order.id, %reason, "order rejected");
        order.status = OrderStatus::Rejected;
        order.updated_at = intent.now;
        self.emit_update(&order, Some(StatusReason::Rejected(reason)), intent);
    }

    fn fire_stop(&mut self, stop: Order, last_price: Price, intent: &mut Intent) -> Result<()> {
        let trigger = stop.stop_trigger().unwrap_or(last_price);
        debug!(symbol = %self.config.symbol, order_id = %stop.id, %trigger, %last_price, "stop triggered");
        intent.events.push(EngineEvent::StopTriggered {
            order_id: stop.id,
            trigger,
            last_price,
            at: intent.now,
        });
        let mut order = stop.into_triggered();
        // A triggered stop queues behind everything already resting.
        order.arrival = self.next_arrival;
        self.next_arrival += 1;
        order.status = OrderStatus::New;
        self.execute(order, intent)
    }

    // =================================================================
    // Matching
    // =================================================================

    fn is_marketable(&self, order: &Order) -> bool {
        self.book
            .best_price(order.side.opposite())
            .is_some_and(|best| order.accepts(best))
    }

    /// Read-only walk: the level prices `order` would print at.
    fn prospective_prices(&self, order: &Order) -> Vec<Price> {
        let mut needed = order.open_quantity();
        let mut prices = Vec::new();
        for level in self.book.iterate_matching_side(order.side, order.limit_price()) {
            if needed.is_zero() {
                break;
            }
            prices.push(level.price);
            needed = needed.saturating_sub(level.open_quantity());
        }
        prices
    }

    /// Displayed plus hidden quantity at acceptable prices, up to `cap`.
    fn available_liquidity(&self, order: &Order, cap: Quantity) -> Quantity {
        let mut total = Quantity::ZERO;
        for level in self.book.iterate_matching_side(order.side, order.limit_price()) {
            total = total.saturating_add(level.open_quantity());
            if total >= cap {
                break;
            }
        }
        total
    }

    /// Steps 1-3 of the matching algorithm for a limit / market / iceberg
    /// order (or a triggered stop).
    fn execute(&mut self, mut order: Order, intent: &mut Intent) -> Result<()> {
        let now = intent.now;
        let marketable = self.is_marketable(&order);

        if order.post_only && marketable {
            self.reject(order, RejectReason::PostOnlyWouldCross, intent);
            return Ok(());
        }
        let total = order.open_quantity();
        if order.time_in_force == TimeInForce::FillOrKill
            && self.available_liquidity(&order, total) < total
        {
            self.reject(order, RejectReason::FillOrKillUnfilled, intent);
            return Ok(());
        }
        if marketable {
            if self.breaker.is_halted() {
                self.reject(order, RejectReason::CircuitBreakerHalt, intent);
                return Ok(());
            }
            let prices = self.prospective_prices(&order);
            if let Some(trip) = self.breaker.evaluate(&prices, now) {
                info!(
                    symbol = %self.config.symbol,
                    reference = %trip.reference,
                    price = %trip.price,
                    until = %trip.until,
                    "circuit breaker halted"
                );
                intent.events.push(EngineEvent::Halted {
                    reference: trip.reference,
                    price: trip.price,
                    until: trip.until,
                });
                self.reject(order, RejectReason::CircuitBreakerHalt, intent);
                return Ok(());
            }
        }

        let mut left = total;
        if marketable {
            self.match_order(&order, &mut left, intent)?;
        }

        let traded = left < total;
        order.updated_at = now;
        if left.is_zero() {
            order.remaining = Quantity::ZERO;
            order.hidden = Quantity::ZERO;
            order.status = OrderStatus::Filled;
            self.emit_update(&order, None, intent);
        } else if order.can_rest() {
            let shown = order.display_size().map_or(left, |display| display.min(left));
            order.remaining = shown;
            order.hidden = left.saturating_sub(shown);
            order.status = if traded {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            };
            if let TimeInForce::GoodTillDate(expires_at) = order.time_in_force {
                self.expiry.insert(order.id, expires_at, order.arrival);
            }
            let update = OrderUpdate::of(&order, None, now);
            let Some(price) = order.price else {
                return Err(self.violation(format!("resting order {} has no price", order.id)));
            };
            intent.touch(order.side, price);
            if let Err(err) = self.book.insert(order) {
                return Err(self.violation(format!("rest failed: {err}")));
            }
            intent.events.push(EngineEvent::OrderUpdated(update));
        } else {
            order.remaining = left;
            order.hidden = Quantity::ZERO;
            order.status = OrderStatus::Cancelled;
            let reason = if order.order_type == OrderType::Market {
                CancelReason::NoLiquidity
            } else {
                CancelReason::ImmediateOrCancel
            };
            self.emit_update(&order, Some(StatusReason::Cancelled(reason)), intent);
        }
        Ok(())
    }

    /// Walk the opposite side, filling `left` of `taker` at resting prices.
    fn match_order(&mut self, taker: &Order, left: &mut Quantity, intent: &mut Intent) -> Result<()> {
        let now = intent.now;
        let maker_side = taker.side.opposite();

        while !left.is_zero() {
            let Some(price) = self.book.best_price(maker_side) else {
                break;
            };
            if !taker.accepts(price) {
                break;
            }

            let Some(maker) = self.book.front_mut(maker_side) else {
                return Err(self.violation(format!("level {price} has no orders")));
            };
            let quantity = (*left).min(maker.remaining);
            if quantity.is_zero() {
                let id = maker.id;
                return Err(self.violation(format!("order {id} rests with nothing displayed")));
            }
            let Some(maker_left) = maker.remaining.checked_sub(quantity) else {
                return Err(self.violation("maker remaining underflow".into()));
            };
            maker.remaining = maker_left;
            maker.updated_at = now;
            if !maker_left.is_zero() {
                maker.status = OrderStatus::PartiallyFilled;
            }
            let maker = maker.clone();

            let Some(taker_left) = left.checked_sub(quantity) else {
                return Err(self.violation("taker remaining underflow".into()));
            };
            *left = taker_left;

            self.trade_sequence += 1;
            let trade = Trade {
                id: TradeId::deterministic(&self.config.symbol, self.trade_sequence),
                symbol: self.config.symbol.clone(),
                sequence: self.trade_sequence,
                maker_order_id: maker.id,
                maker_account_id: maker.account_id,
                taker_order_id: taker.id,
                taker_account_id: taker.account_id,
                taker_side: taker.side,
                price,
                quantity,
                executed_at: now,
            };
            debug!(symbol = %self.config.symbol, sequence = trade.sequence, %price, %quantity, "trade");
            intent.events.push(EngineEvent::Trade(trade));
            intent.touch(maker_side, price);
            self.last_trade_price = Some(price);
            self.last_price = Some(price);
            self.breaker.record_print(price, now);

            if !maker_left.is_zero() {
                self.emit_update(&maker, None, intent);
                continue;
            }

            let Some(mut maker) = self.book.pop_front(maker_side) else {
                return Err(self.violation(format!("maker {} vanished from level {price}", maker.id)));
            };
            if maker.hidden.is_zero() {
                maker.status = OrderStatus::Filled;
                self.emit_update(&maker, None, intent);
            } else {
                self.replenish(maker, intent)?;
            }
        }
        Ok(())
    }

    /// Draw a new iceberg slice from reserve and requeue it at the back of
    /// its level. The slice loses time priority.
    fn replenish(&mut self, mut maker: Order, intent: &mut Intent) -> Result<()> {
        let display = maker.display_size().unwrap_or(maker.hidden);
        let slice = display.min(maker.hidden);
        let Some(hidden) = maker.hidden.checked_sub(slice) else {
            return Err(self.violation("iceberg reserve underflow".into()));
        };
        maker.hidden = hidden;
        maker.remaining = slice;
        maker.status = OrderStatus::PartiallyFilled;
        maker.arrival = self.next_arrival;
        self.next_arrival += 1;

        let update = OrderUpdate::of(&maker, None, intent.now);
        if let Err(err) = self.book.insert(maker) {
            return Err(self.violation(format!("iceberg requeue failed: {err}")));
        }
        intent.events.push(EngineEvent::OrderUpdated(update));
        Ok(())
    }

    // =================================================================
    // Bookkeeping
    // =================================================================

    /// Report a state change; terminal orders are forgotten everywhere
    /// except the terminal cache, and their OCO sibling is queued.
    fn emit_update(&mut self, order: &Order, reason: Option<StatusReason>, intent: &mut Intent) {
        intent
            .events
            .push(EngineEvent::OrderUpdated(OrderUpdate::of(order, reason, intent.now)));

        if !order.status.is_terminal() {
            return;
        }
        self.terminal.record(order);
        self.expiry.remove(&order.id);
        if let Some(cid) = &order.client_order_id {
            let key = (order.account_id, cid.clone());
            if self.clients.get(&key) == Some(&order.id) {
                self.clients.remove(&key);
            }
        }
        if let Some(sibling) = self.links.remove(&order.id) {
            self.links.remove(&sibling);
            intent.siblings.push(sibling);
        }
    }

    /// Cancel queued OCO siblings that are still live.
    fn settle_links(&mut self, intent: &mut Intent) -> Result<()> {
        while let Some(sibling) = intent.siblings.pop() {
            if let Some(mut order) = self.take_live(&sibling, intent)? {
                debug!(symbol = %self.config.symbol, order_id = %order.id, "oco sibling cancelled");
                order.status = OrderStatus::Cancelled;
                order.updated_at = intent.now;
                self.emit_update(&order, Some(StatusReason::Cancelled(CancelReason::OcoSiblingDone)), intent);
            }
        }
        Ok(())
    }

    /// Take a live order out of the book or the stop set.
    fn take_live(&mut self, order_id: &OrderId, intent: &mut Intent) -> Result<Option<Order>> {
        if let Some(order) = self.stops.remove(order_id) {
            return Ok(Some(order));
        }
        if !self.book.contains_order(order_id) {
            return Ok(None);
        }
        match self.book.remove(order_id) {
            Ok(order) => {
                if let Some(price) = order.price {
                    intent.touch(order.side, price);
                }
                Ok(Some(order))
            }
            Err(err) => Err(self.violation(format!("book index out of sync: {err}"))),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.fault.is_some() {
            return Err(TapelineError::SymbolFaulted(self.config.symbol.clone()));
        }
        Ok(())
    }

    fn ensure_unknown(&self, order_id: OrderId) -> Result<()> {
        if self.book.contains_order(&order_id)
            || self.stops.contains(&order_id)
            || self.terminal.contains(&order_id)
        {
            return Err(TapelineError::DuplicateOrder(order_id));
        }
        Ok(())
    }

    fn violation(&self, reason: String) -> TapelineError {
        TapelineError::InvariantViolation {
            symbol: self.config.symbol.clone(),
            reason,
        }
    }
}
