//! Bounded memory of orders that reached a terminal status.
//!
//! Lets a late cancel answer `AlreadyTerminal` instead of `UnknownOrder`.
//! Entries are evicted oldest-first once `max_size` is reached, so memory
//! stays flat in long-running engines.

use std::collections::{HashMap, VecDeque};

use tapeline_types::{AccountId, ClientOrderId, Order, OrderId, OrderStatus};

type ClientKey = (AccountId, ClientOrderId);

#[derive(Debug)]
pub struct TerminalCache {
    statuses: HashMap<OrderId, OrderStatus>,
    clients: HashMap<ClientKey, OrderId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<(OrderId, Option<ClientKey>)>,
    max_size: usize,
}

impl TerminalCache {
    /// A zero `max_size` is treated as one.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            statuses: HashMap::new(),
            clients: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Remember a terminal order. Re-recording an id is a no-op.
    pub fn record(&mut self, order: &Order) {
        if self.statuses.contains_key(&order.id) {
            return;
        }

        if self.statuses.len() >= self.max_size {
            if let Some((oldest, client)) = self.order.pop_front() {
                self.statuses.remove(&oldest);
                if let Some(key) = client {
                    if self.clients.get(&key) == Some(&oldest) {
                        self.clients.remove(&key);
                    }
                }
            }
        }

        let client = order
            .client_order_id
            .clone()
            .map(|cid| (order.account_id, cid));
        if let Some(key) = &client {
            self.clients.insert(key.clone(), order.id);
        }
        self.statuses.insert(order.id, order.status);
        self.order.push_back((order.id, client));
    }

    #[must_use]
    pub fn status(&self, order_id: &OrderId) -> Option<OrderStatus> {
        self.statuses.get(order_id).copied()
    }

    #[must_use]
    pub fn lookup_client(&self, account_id: AccountId, client_order_id: &ClientOrderId) -> Option<OrderId> {
        self.clients
            .get(&(account_id, client_order_id.clone()))
            .copied()
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.statuses.contains_key(order_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tapeline_types::*;

    use super::*;

    fn terminal(status: OrderStatus) -> Order {
        let mut order = Order::dummy_limit(Side::Buy, Price(1), Quantity(1));
        order.status = status;
        order
    }

    #[test]
    fn remembers_status() {
        let mut cache = TerminalCache::new(10);
        let order = terminal(OrderStatus::Filled);
        cache.record(&order);
        assert_eq!(cache.status(&order.id), Some(OrderStatus::Filled));
        assert!(cache.status(&OrderId::new()).is_none());
    }

    #[test]
    fn client_lookup() {
        let mut cache = TerminalCache::new(10);
        let mut order = terminal(OrderStatus::Cancelled);
        order.client_order_id = Some(ClientOrderId::new("c-9"));
        cache.record(&order);
        assert_eq!(
            cache.lookup_client(order.account_id, &ClientOrderId::new("c-9")),
            Some(order.id)
        );
        assert!(cache
            .lookup_client(AccountId::new(), &ClientOrderId::new("c-9"))
            .is_none());
    }

    #[test]
    fn evicts_oldest() {
        let mut cache = TerminalCache::new(2);
        let a = terminal(OrderStatus::Filled);
        let b = terminal(OrderStatus::Expired);
        let c = terminal(OrderStatus::Rejected);
        cache.record(&a);
        cache.record(&b);
        cache.record(&c);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&a.id), "a should have been evicted");
        assert!(cache.contains(&b.id));
        assert!(cache.contains(&c.id));
    }

    #[test]
    fn duplicate_record_ignored() {
        let mut cache = TerminalCache::new(2);
        let a = terminal(OrderStatus::Filled);
        cache.record(&a);
        cache.record(&a);
        assert_eq!(cache.len(), 1);
    }
}
