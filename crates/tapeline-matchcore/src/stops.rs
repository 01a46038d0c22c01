//! Pending stop orders, indexed by trigger price.
//!
//! A buy stop fires once the last price is at or above its trigger; a sell
//! stop once it is at or below. Among the stops a price satisfies, the one
//! that arrived first fires first.

use std::collections::{BTreeMap, HashMap};

use tapeline_types::{Order, OrderId, Price, Side};

#[derive(Debug, Default)]
pub struct StopBook {
    orders: HashMap<OrderId, Order>,
    /// `(trigger, arrival)` of buy stops.
    buys: BTreeMap<(Price, u64), OrderId>,
    /// `(trigger, arrival)` of sell stops.
    sells: BTreeMap<(Price, u64), OrderId>,
}

impl StopBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a stop. Orders without a trigger are handed back.
    pub fn insert(&mut self, order: Order) -> Result<(), Order> {
        let Some(trigger) = order.stop_trigger() else {
            return Err(order);
        };
        let key = (trigger, order.arrival);
        match order.side {
            Side::Buy => self.buys.insert(key, order.id),
            Side::Sell => self.sells.insert(key, order.id),
        };
        self.orders.insert(order.id, order);
        Ok(())
    }

    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        if let Some(trigger) = order.stop_trigger() {
            let key = (trigger, order.arrival);
            match order.side {
                Side::Buy => self.buys.remove(&key),
                Side::Sell => self.sells.remove(&key),
            };
        }
        Some(order)
    }

    /// Remove and return the earliest-arrived stop that `last_price` fires.
    pub fn pop_triggered(&mut self, last_price: Price) -> Option<Order> {
        let buy = self
            .buys
            .range(..=(last_price, u64::MAX))
            .min_by_key(|((_, arrival), _)| *arrival)
            .map(|((_, arrival), id)| (*arrival, *id));
        let sell = self
            .sells
            .range((last_price, 0)..)
            .min_by_key(|((_, arrival), _)| *arrival)
            .map(|((_, arrival), id)| (*arrival, *id));

        let (_, id) = match (buy, sell) {
            (Some(b), Some(s)) => b.min(s),
            (Some(b), None) => b,
            (None, Some(s)) => s,
            (None, None) => return None,
        };
        self.remove(&id)
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Pending stops in arrival order.
    #[must_use]
    pub fn by_arrival(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.values().collect();
        orders.sort_by_key(|o| o.arrival);
        orders
    }
}

/// Whether `last_price` fires a stop on `side` with `trigger`.
#[must_use]
pub fn is_triggered(side: Side, trigger: Price, last_price: Price) -> bool {
    match side {
        Side::Buy => last_price >= trigger,
        Side::Sell => last_price <= trigger,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tapeline_types::*;

    use super::*;

    fn stop(side: Side, trigger: u64, arrival: u64) -> Order {
        let req = OrderRequest::stop(
            AccountId::new(),
            Symbol::new("BTC-USD"),
            side,
            Price(trigger),
            None,
            Quantity(1),
        );
        let mut order = Order::from_request(OrderId::new(), &req, Utc::now());
        order.arrival = arrival;
        order
    }

    #[test]
    fn sell_stop_fires_at_or_below_trigger() {
        let mut stops = StopBook::new();
        let s = stop(Side::Sell, 95, 1);
        let id = s.id;
        stops.insert(s).unwrap();

        assert!(stops.pop_triggered(Price(96)).is_none());
        assert_eq!(stops.pop_triggered(Price(95)).unwrap().id, id);
        assert!(stops.is_empty());
    }

    #[test]
    fn buy_stop_fires_at_or_above_trigger() {
        let mut stops = StopBook::new();
        stops.insert(stop(Side::Buy, 105, 1)).unwrap();
        assert!(stops.pop_triggered(Price(104)).is_none());
        assert!(stops.pop_triggered(Price(110)).is_some());
    }

    #[test]
    fn earliest_arrival_fires_first() {
        let mut stops = StopBook::new();
        let late = stop(Side::Sell, 99, 7);
        let early = stop(Side::Sell, 95, 3);
        let buy = stop(Side::Buy, 90, 5);
        let early_id = early.id;
        let buy_id = buy.id;
        let late_id = late.id;
        stops.insert(late).unwrap();
        stops.insert(early).unwrap();
        stops.insert(buy).unwrap();

        assert_eq!(stops.pop_triggered(Price(94)).unwrap().id, early_id);
        assert_eq!(stops.pop_triggered(Price(94)).unwrap().id, buy_id);
        assert_eq!(stops.pop_triggered(Price(94)).unwrap().id, late_id);
        assert!(stops.pop_triggered(Price(94)).is_none());
    }

    #[test]
    fn remove_clears_trigger_index() {
        let mut stops = StopBook::new();
        let s = stop(Side::Buy, 105, 1);
        let id = s.id;
        stops.insert(s).unwrap();
        assert!(stops.remove(&id).is_some());
        assert!(stops.pop_triggered(Price(200)).is_none());
    }

    #[test]
    fn non_stop_is_handed_back() {
        let mut stops = StopBook::new();
        let limit = Order::dummy_limit(Side::Buy, Price(1), Quantity(1));
        assert!(stops.insert(limit).is_err());
    }

    #[test]
    fn trigger_direction() {
        assert!(is_triggered(Side::Buy, Price(100), Price(100)));
        assert!(!is_triggered(Side::Buy, Price(100), Price(99)));
        assert!(is_triggered(Side::Sell, Price(95), Price(90)));
        assert!(!is_triggered(Side::Sell, Price(95), Price(96)));
    }
}
