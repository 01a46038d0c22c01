//! One price on one side of the book: a FIFO queue of resting orders.
//!
//! Matching only ever takes from the front and new or refilled orders
//! join at the back, so a [`VecDeque`] gives O(1) for both.

use std::collections::VecDeque;

use tapeline_types::{Order, OrderId, Price, Quantity};

/// Resting orders at `price`, earliest arrival first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Price,
    /// Front is next to trade.
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Queue behind everything already resting here.
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Displayed quantity across all orders at this level.
    #[must_use]
    pub fn total_quantity(&self) -> Quantity {
        self.orders.iter().map(|o| o.remaining).sum()
    }

    /// Displayed plus hidden quantity at this level.
    #[must_use]
    pub fn open_quantity(&self) -> Quantity {
        self.orders.iter().map(Order::open_quantity).sum()
    }

    /// Take `order_id` out of the queue, wherever it sits.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == *order_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use tapeline_types::*;

    use super::*;

    fn make_order(qty: u64, arrival: u64) -> Order {
        let mut order = Order::dummy_limit(Side::Buy, Price(100), Quantity(qty));
        order.arrival = arrival;
        order
    }

    #[test]
    fn push_pop_fifo() {
        let mut level = PriceLevel::new(Price(100));
        let o1 = make_order(1, 0);
        let o2 = make_order(1, 1);
        let id1 = o1.id;

        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.len(), 2);
        let popped = level.pop_front().unwrap();
        assert_eq!(popped.id, id1, "FIFO: first in should be first out");
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn displayed_and_open_quantity() {
        let mut level = PriceLevel::new(Price(100));
        level.push_back(make_order(5, 0));
        let mut iceberg = make_order(3, 1);
        iceberg.hidden = Quantity(7);
        level.push_back(iceberg);
        assert_eq!(level.total_quantity(), Quantity(8));
        assert_eq!(level.open_quantity(), Quantity(15));
    }

    #[test]
    fn remove_order_by_id() {
        let mut level = PriceLevel::new(Price(100));
        let o1 = make_order(1, 0);
        let o2 = make_order(1, 1);
        let target_id = o2.id;

        level.push_back(o1);
        level.push_back(o2);

        let removed = level.remove_order(&target_id);
        assert_eq!(removed.map(|o| o.id), Some(target_id));
        assert_eq!(level.len(), 1);
        assert!(level.remove_order(&OrderId::new()).is_none());
    }

    #[test]
    fn front_mut_edits_in_place() {
        let mut level = PriceLevel::new(Price(100));
        level.push_back(make_order(10, 0));
        level.front_mut().unwrap().remaining = Quantity(4);
        assert_eq!(level.total_quantity(), Quantity(4));
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(Price(100));
        assert!(level.is_empty());
        assert_eq!(level.total_quantity(), Quantity::ZERO);
        assert!(level.front().is_none());
    }
}
