//! Integration test: reference scenarios
//!
//! Each test drives a fresh engine through one of the canonical
//! walkthroughs: resting and taking, FIFO inside a level, stop
//! cascades, the circuit breaker, and iceberg refills.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use tapeline_matchcore::{BreakerState, MatchingEngine, Outcome};
use tapeline_types::*;

const SYMBOL: &str = "BTC-USD";

fn t(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(1_700_000_000_000 + ms)
}

fn engine() -> MatchingEngine {
    MatchingEngine::new(SymbolConfig::new(SYMBOL).with_breaker(BreakerConfig::disabled()))
}

fn stamp(request: &OrderRequest) -> Order {
    Order::from_request(OrderId::new(), request, t(0))
}

fn limit(side: Side, price: u64, qty: u64) -> Order {
    stamp(&OrderRequest::limit(
        AccountId::new(),
        Symbol::new(SYMBOL),
        side,
        Price(price),
        Quantity(qty),
    ))
}

fn market(side: Side, qty: u64) -> Order {
    stamp(&OrderRequest::market(
        AccountId::new(),
        Symbol::new(SYMBOL),
        side,
        Quantity(qty),
    ))
}

fn trades(outcome: &Outcome) -> Vec<(OrderId, u64, u64)> {
    outcome
        .trades()
        .map(|trade| (trade.maker_order_id, trade.quantity.0, trade.price.0))
        .collect()
}

#[test]
fn scenario_a_market_order_takes_from_resting_ask() {
    let mut engine = engine();
    let ask = limit(Side::Sell, 10, 100);
    let ask_id = ask.id;

    engine.submit(ask, t(1)).unwrap();
    let snapshot = engine.snapshot(5);
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].price, Price(10));
    assert_eq!(snapshot.asks[0].quantity, Quantity(100));

    let outcome = engine.submit(market(Side::Buy, 60), t(2)).unwrap();
    assert_eq!(trades(&outcome), vec![(ask_id, 60, 10)]);
    assert_eq!(engine.book().level_quantity(Side::Sell, Price(10)), Quantity(40));
    assert_eq!(
        outcome.deltas,
        vec![BookDelta {
            side: Side::Sell,
            price: Price(10),
            quantity: Quantity(40),
        }]
    );
    assert_eq!(
        outcome.final_update(ask_id).unwrap().status,
        OrderStatus::PartiallyFilled
    );
}

#[test]
fn scenario_b_fifo_within_level() {
    let mut engine = engine();
    let a = limit(Side::Sell, 10, 50);
    let b = limit(Side::Sell, 10, 50);
    let (a_id, b_id) = (a.id, b.id);
    engine.submit(a, t(1)).unwrap();
    engine.submit(b, t(2)).unwrap();

    let outcome = engine.submit(market(Side::Buy, 70), t(3)).unwrap();
    assert_eq!(trades(&outcome), vec![(a_id, 50, 10), (b_id, 20, 10)]);
    assert_eq!(outcome.final_update(a_id).unwrap().status, OrderStatus::Filled);

    let b_resting = engine.order(&b_id).unwrap();
    assert_eq!(b_resting.remaining, Quantity(30));
    assert_eq!(b_resting.status, OrderStatus::PartiallyFilled);
    assert!(engine.order(&a_id).is_none());
}

#[test]
fn scenario_c_stop_fires_after_triggering_trade() {
    let mut engine = engine();
    // Print at 100.
    engine.submit(limit(Side::Sell, 100, 1), t(1)).unwrap();
    engine.submit(limit(Side::Buy, 100, 1), t(2)).unwrap();
    assert_eq!(engine.last_trade_price(), Some(Price(100)));

    let stop = stamp(&OrderRequest::stop(
        AccountId::new(),
        Symbol::new(SYMBOL),
        Side::Sell,
        Price(95),
        None,
        Quantity(5),
    ));
    let stop_id = stop.id;
    let outcome = engine.submit(stop, t(3)).unwrap();
    assert_eq!(
        outcome.final_update(stop_id).unwrap().status,
        OrderStatus::PendingTrigger
    );
    assert!(engine.book().is_empty());

    let bid_95 = limit(Side::Buy, 95, 1);
    let bid_90 = limit(Side::Buy, 90, 10);
    let bid_90_id = bid_90.id;
    engine.submit(bid_95, t(4)).unwrap();
    engine.submit(bid_90, t(5)).unwrap();

    let seller = limit(Side::Sell, 95, 1);
    let seller_id = seller.id;
    let outcome = engine.submit(seller, t(6)).unwrap();

    // The triggering intent completes before the stop runs.
    let seller_done = outcome
        .events
        .iter()
        .position(|e| matches!(e, EngineEvent::OrderUpdated(u) if u.order_id == seller_id))
        .unwrap();
    let triggered = outcome
        .events
        .iter()
        .position(|e| matches!(e, EngineEvent::StopTriggered { order_id, .. } if *order_id == stop_id))
        .unwrap();
    assert!(seller_done < triggered);

    let prints: Vec<(u64, u64)> = outcome.trades().map(|tr| (tr.price.0, tr.quantity.0)).collect();
    assert_eq!(prints, vec![(95, 1), (90, 5)]);
    let stop_trade = outcome.trades().nth(1).unwrap();
    assert_eq!(stop_trade.taker_order_id, stop_id);
    assert_eq!(stop_trade.maker_order_id, bid_90_id);
    assert_eq!(outcome.final_update(stop_id).unwrap().status, OrderStatus::Filled);
    assert_eq!(engine.pending_stops(), 0);
}

#[test]
fn stop_cascade_fires_in_arrival_order() {
    let mut engine = engine();
    engine.update_reference_price(Price(100), t(0)).unwrap();

    let first = stamp(&OrderRequest::stop(
        AccountId::new(),
        Symbol::new(SYMBOL),
        Side::Sell,
        Price(95),
        None,
        Quantity(1),
    ));
    let second = stamp(&OrderRequest::stop(
        AccountId::new(),
        Symbol::new(SYMBOL),
        Side::Sell,
        Price(99),
        None,
        Quantity(1),
    ));
    let (first_id, second_id) = (first.id, second.id);
    engine.submit(first, t(1)).unwrap();
    engine.submit(second, t(2)).unwrap();
    engine.submit(limit(Side::Buy, 90, 10), t(3)).unwrap();

    let outcome = engine.update_reference_price(Price(94), t(4)).unwrap();
    let fired: Vec<OrderId> = outcome
        .events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StopTriggered { order_id, .. } => Some(*order_id),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec![first_id, second_id]);
    assert_eq!(outcome.trades().count(), 2);
}

#[test]
fn scenario_d_breaker_rejects_but_cancel_goes_through() {
    let config = SymbolConfig::new(SYMBOL).with_breaker(BreakerConfig {
        enabled: true,
        threshold: Decimal::new(10, 2),
        window_ms: 60_000,
        cooldown_ms: 30_000,
        reset_reference_on_resume: true,
    });
    let mut engine = MatchingEngine::new(config);
    engine.update_reference_price(Price(100), t(0)).unwrap();

    let ask = limit(Side::Sell, 80, 10);
    let ask_id = ask.id;
    engine.submit(ask, t(1)).unwrap();

    let buy = market(Side::Buy, 5);
    let buy_id = buy.id;
    let outcome = engine.submit(buy, t(2)).unwrap();
    assert_eq!(outcome.trades().count(), 0);
    assert!(outcome.events.iter().any(|e| matches!(
        e,
        EngineEvent::Halted {
            reference: Price(100),
            price: Price(80),
            ..
        }
    )));
    let update = outcome.final_update(buy_id).unwrap();
    assert_eq!(update.status, OrderStatus::Rejected);
    assert_eq!(
        update.reason,
        Some(StatusReason::Rejected(RejectReason::CircuitBreakerHalt))
    );
    assert!(RejectReason::CircuitBreakerHalt.is_retryable());

    let outcome = engine.cancel(CancelTarget::Order(ask_id), t(3)).unwrap();
    assert_eq!(
        outcome.final_update(ask_id).unwrap().status,
        OrderStatus::Cancelled
    );
    assert!(matches!(engine.breaker_state(), BreakerState::Halted { .. }));
    assert!(engine.book().is_empty());
}

#[test]
fn scenario_e_iceberg_refill_loses_priority() {
    let mut engine = engine();
    let iceberg = stamp(&OrderRequest::iceberg(
        AccountId::new(),
        Symbol::new(SYMBOL),
        Side::Sell,
        Price(10),
        Quantity(1000),
        Quantity(100),
    ));
    let ice_id = iceberg.id;
    engine.submit(iceberg, t(1)).unwrap();
    assert_eq!(engine.snapshot(1).asks[0].quantity, Quantity(100));

    // Arrives while the first slice is resting.
    let later = limit(Side::Sell, 10, 50);
    let later_id = later.id;
    engine.submit(later, t(2)).unwrap();

    let outcome = engine.submit(market(Side::Buy, 100), t(3)).unwrap();
    assert_eq!(trades(&outcome), vec![(ice_id, 100, 10)]);
    let refill = outcome.final_update(ice_id).unwrap();
    assert_eq!(refill.remaining, Quantity(100));
    assert_eq!(refill.hidden, Quantity(800));
    assert_eq!(refill.filled, Quantity(100));
    assert_eq!(outcome.deltas[0].quantity, Quantity(150));

    let level = engine.book().level(Side::Sell, Price(10)).unwrap();
    let queue: Vec<OrderId> = level.orders.iter().map(|o| o.id).collect();
    assert_eq!(queue, vec![later_id, ice_id]);

    let outcome = engine.submit(market(Side::Buy, 120), t(4)).unwrap();
    assert_eq!(trades(&outcome), vec![(later_id, 50, 10), (ice_id, 70, 10)]);
    assert_eq!(engine.book().level_quantity(Side::Sell, Price(10)), Quantity(30));
}

#[test]
fn cancel_is_idempotent_for_every_terminal_state() {
    let mut engine = engine();

    let filled = limit(Side::Sell, 10, 5);
    let filled_id = filled.id;
    engine.submit(filled, t(1)).unwrap();
    engine.submit(market(Side::Buy, 5), t(2)).unwrap();

    let ioc = stamp(
        &OrderRequest::limit(AccountId::new(), Symbol::new(SYMBOL), Side::Buy, Price(9), Quantity(5))
            .with_time_in_force(TimeInForce::ImmediateOrCancel),
    );
    let ioc_id = ioc.id;
    engine.submit(ioc, t(3)).unwrap();

    let gtd = stamp(
        &OrderRequest::limit(AccountId::new(), Symbol::new(SYMBOL), Side::Buy, Price(8), Quantity(5))
            .with_time_in_force(TimeInForce::GoodTillDate(t(10))),
    );
    let gtd_id = gtd.id;
    engine.submit(gtd, t(4)).unwrap();
    let outcome = engine.expire_due(t(10)).unwrap();
    assert_eq!(outcome.final_update(gtd_id).unwrap().status, OrderStatus::Expired);

    for id in [filled_id, ioc_id, gtd_id] {
        for attempt in 0..2 {
            let outcome = engine.cancel(CancelTarget::Order(id), t(20 + attempt)).unwrap();
            assert_eq!(outcome.cancel_rejection(), Some(RejectReason::AlreadyTerminal));
            assert!(outcome.trades().next().is_none());
            assert!(outcome.deltas.is_empty());
        }
    }
    assert!(engine.book().is_empty());
}
