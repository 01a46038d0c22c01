//! Market-data fan-out.
//!
//! One [`MarketDataPublisher`] per symbol, driven only by that symbol's
//! audit writer, so events leave in audit order. Delivery is lossy: a
//! subscriber that falls more than `market_data_capacity` events behind
//! loses the oldest ones and is told how many through [`Delivery::Gap`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapeline_types::{BookDelta, EngineEvent, OrderId, OrderUpdate, Price, Symbol, Trade};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

/// Public view of one state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketData {
    Trade(Trade),
    Order(OrderUpdate),
    StopTriggered {
        order_id: OrderId,
        trigger: Price,
        at: DateTime<Utc>,
    },
    Halted {
        reference: Price,
        price: Price,
        until: DateTime<Utc>,
    },
    Resumed {
        at: DateTime<Utc>,
    },
    /// Displayed level changes of one intent.
    Book(Vec<BookDelta>),
}

impl MarketData {
    /// Refused cancels change nothing and are not published.
    #[must_use]
    pub fn from_engine(event: &EngineEvent) -> Option<Self> {
        match event {
            EngineEvent::OrderUpdated(update) => Some(Self::Order(update.clone())),
            EngineEvent::Trade(trade) => Some(Self::Trade(trade.clone())),
            EngineEvent::StopTriggered {
                order_id, trigger, at, ..
            } => Some(Self::StopTriggered {
                order_id: *order_id,
                trigger: *trigger,
                at: *at,
            }),
            EngineEvent::Halted {
                reference,
                price,
                until,
            } => Some(Self::Halted {
                reference: *reference,
                price: *price,
                until: *until,
            }),
            EngineEvent::Resumed { at } => Some(Self::Resumed { at: *at }),
            EngineEvent::CancelRejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataEvent {
    pub symbol: Symbol,
    /// Audit sequence this event derives from. For `Book` it is the last
    /// record of the intent.
    pub sequence: u64,
    pub data: MarketData,
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Event(MarketDataEvent),
    /// `missed` events were dropped; re-sync from a depth snapshot.
    Gap { missed: u64 },
}

#[derive(Debug, Clone)]
pub struct MarketDataPublisher {
    symbol: Symbol,
    sender: broadcast::Sender<MarketDataEvent>,
}

impl MarketDataPublisher {
    #[must_use]
    pub fn new(symbol: Symbol, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { symbol, sender }
    }

    /// Fire and forget. Having no subscribers is not an error.
    pub fn publish(&self, sequence: u64, data: MarketData) {
        let event = MarketDataEvent {
            symbol: self.symbol.clone(),
            sequence,
            data,
        };
        match self.sender.send(event) {
            Ok(receivers) => trace!(symbol = %self.symbol, sequence, receivers, "market data published"),
            Err(_) => trace!(symbol = %self.symbol, sequence, "market data dropped, no subscribers"),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            symbol: self.symbol.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A subscriber's cursor into one symbol's stream.
#[derive(Debug)]
pub struct Subscription {
    symbol: Symbol,
    receiver: broadcast::Receiver<MarketDataEvent>,
}

impl Subscription {
    /// Wait for the next delivery. `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        match self.receiver.recv().await {
            Ok(event) => Some(Delivery::Event(event)),
            Err(RecvError::Lagged(missed)) => Some(self.gap(missed)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`Subscription::next`]. `None` when nothing
    /// is queued or the publisher is gone.
    pub fn try_next(&mut self) -> Option<Delivery> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(TryRecvError::Lagged(missed)) => Some(self.gap(missed)),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn gap(&self, missed: u64) -> Delivery {
        warn!(symbol = %self.symbol, missed, "market data subscriber lagged");
        Delivery::Gap { missed }
    }
}

#[cfg(test)]
mod tests {
    use tapeline_types::*;

    use super::*;

    fn delta(price: u64) -> MarketData {
        MarketData::Book(vec![BookDelta {
            side: Side::Buy,
            price: Price(price),
            quantity: Quantity(1),
        }])
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let publisher = MarketDataPublisher::new(Symbol::new("BTC-USD"), 4);
        publisher.publish(1, delta(100));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let publisher = MarketDataPublisher::new(Symbol::new("BTC-USD"), 8);
        let mut sub = publisher.subscribe();
        for seq in 1..=3 {
            publisher.publish(seq, delta(100 + seq));
        }
        for seq in 1..=3 {
            match sub.try_next() {
                Some(Delivery::Event(event)) => assert_eq!(event.sequence, seq),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn lagging_subscriber_sees_gap_then_newest() {
        let publisher = MarketDataPublisher::new(Symbol::new("BTC-USD"), 2);
        let mut sub = publisher.subscribe();
        for seq in 1..=5 {
            publisher.publish(seq, delta(100));
        }
        assert_eq!(sub.try_next(), Some(Delivery::Gap { missed: 3 }));
        match sub.try_next() {
            Some(Delivery::Event(event)) => assert_eq!(event.sequence, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn refused_cancel_is_not_public() {
        let event = EngineEvent::CancelRejected {
            target: CancelTarget::Order(OrderId::new()),
            reason: RejectReason::AlreadyTerminal,
            at: Utc::now(),
        };
        assert!(MarketData::from_engine(&event).is_none());
        let resumed = EngineEvent::Resumed { at: Utc::now() };
        assert!(matches!(MarketData::from_engine(&resumed), Some(MarketData::Resumed { .. })));
    }

    #[tokio::test]
    async fn closed_publisher_ends_stream() {
        let publisher = MarketDataPublisher::new(Symbol::new("BTC-USD"), 2);
        let mut sub = publisher.subscribe();
        publisher.publish(1, delta(100));
        drop(publisher);
        assert!(matches!(sub.next().await, Some(Delivery::Event(_))));
        assert!(sub.next().await.is_none());
    }
}
