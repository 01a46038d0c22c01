//! Good-till-date expiry queue.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tapeline_types::OrderId;

/// Live GTD orders keyed by `(expires_at, arrival)`.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    by_time: BTreeMap<(DateTime<Utc>, u64), OrderId>,
    by_id: HashMap<OrderId, (DateTime<Utc>, u64)>,
}

impl ExpiryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order_id: OrderId, expires_at: DateTime<Utc>, arrival: u64) {
        let key = (expires_at, arrival);
        if let Some(old) = self.by_id.insert(order_id, key) {
            self.by_time.remove(&old);
        }
        self.by_time.insert(key, order_id);
    }

    pub fn remove(&mut self, order_id: &OrderId) {
        if let Some(key) = self.by_id.remove(order_id) {
            self.by_time.remove(&key);
        }
    }

    /// Remove and return every order whose expiry is at or before `now`,
    /// earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<OrderId> {
        let mut due = Vec::new();
        while let Some(entry) = self.by_time.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let id = entry.remove();
            self.by_id.remove(&id);
            due.push(id);
        }
        due
    }

    #[must_use]
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.by_time.keys().next().map(|(at, _)| *at)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn pops_only_due_orders_in_time_order() {
        let t0 = Utc::now();
        let mut queue = ExpiryQueue::new();
        let a = OrderId::from_u128(1);
        let b = OrderId::from_u128(2);
        let c = OrderId::from_u128(3);
        queue.insert(b, t0 + Duration::seconds(2), 2);
        queue.insert(a, t0 + Duration::seconds(1), 1);
        queue.insert(c, t0 + Duration::seconds(10), 3);

        assert!(queue.pop_due(t0).is_empty());
        assert_eq!(queue.pop_due(t0 + Duration::seconds(2)), vec![a, b]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_expiry(), Some(t0 + Duration::seconds(10)));
    }

    #[test]
    fn remove_cancels_expiry() {
        let t0 = Utc::now();
        let mut queue = ExpiryQueue::new();
        let a = OrderId::from_u128(1);
        queue.insert(a, t0, 1);
        queue.remove(&a);
        assert!(queue.pop_due(t0).is_empty());
        assert!(queue.is_empty());
    }
}
