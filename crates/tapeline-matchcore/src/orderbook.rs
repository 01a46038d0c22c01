//! The order book for a single symbol.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Price>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Price, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) removal.
//! The book holds no matching policy; the engine drives it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tapeline_types::*;

use crate::price_level::PriceLevel;

/// Aggregated view of one price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    /// Displayed quantity only.
    pub quantity: Quantity,
    pub orders: usize,
}

/// Top-of-book depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub last_trade_price: Option<Price>,
    pub halted: bool,
}

impl BookSnapshot {
    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }
}

/// Whether an aggressor on `side` with `limit` would trade at `level_price`.
#[must_use]
pub fn is_acceptable(side: Side, limit: Option<Price>, level_price: Price) -> bool {
    match (side, limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => level_price <= limit,
        (Side::Sell, Some(limit)) => level_price >= limit,
    }
}

/// The order book for a single symbol.
#[derive(Debug)]
pub struct OrderBook {
    pub symbol: Symbol,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Price, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)`.
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion / removal
    // =================================================================

    /// Rest an order at the back of its price level.
    pub fn insert(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(TapelineError::DuplicateOrder(order.id));
        }
        let Some(price) = order.price else {
            return Err(TapelineError::InvalidOrder {
                reason: format!("order {} has no price to rest at", order.id),
            });
        };
        self.index.insert(order.id, (order.side, price));

        match order.side {
            Side::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
            Side::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
        }
        Ok(())
    }

    /// Remove an order by id, dropping its level if it becomes empty.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(TapelineError::OrderNotFound(*order_id))?;

        let order = match side {
            Side::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(TapelineError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(TapelineError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            Side::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(TapelineError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(TapelineError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        };

        Ok(order)
    }

    // =================================================================
    // Best-level access (for the matcher)
    // =================================================================

    /// Best price on `side`.
    #[must_use]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Mutable access to the oldest order at the best level of `side`.
    pub fn front_mut(&mut self, side: Side) -> Option<&mut Order> {
        match side {
            Side::Buy => self.bids.values_mut().next()?.front_mut(),
            Side::Sell => self.asks.values_mut().next()?.front_mut(),
        }
    }

    /// Pop the oldest order at the best level of `side`.
    pub fn pop_front(&mut self, side: Side) -> Option<Order> {
        let order = match side {
            Side::Buy => {
                let mut entry = self.bids.first_entry()?;
                let order = entry.get_mut().pop_front();
                if entry.get().is_empty() {
                    entry.remove();
                }
                order
            }
            Side::Sell => {
                let mut entry = self.asks.first_entry()?;
                let order = entry.get_mut().pop_front();
                if entry.get().is_empty() {
                    entry.remove();
                }
                order
            }
        }?;
        self.index.remove(&order.id);
        Some(order)
    }

    /// Levels of the side opposite `side`, best first, for as long as their
    /// price is acceptable to an aggressor with `price_limit`.
    pub fn iterate_matching_side(
        &self,
        side: Side,
        price_limit: Option<Price>,
    ) -> impl Iterator<Item = &PriceLevel> + '_ {
        let levels: Box<dyn Iterator<Item = &PriceLevel> + '_> = match side {
            Side::Buy => Box::new(self.asks.values()),
            Side::Sell => Box::new(self.bids.values()),
        };
        levels.take_while(move |level| is_acceptable(side, price_limit, level.price))
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    #[must_use]
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.0.saturating_sub(bid.0)),
            _ => None,
        }
    }

    /// A crossed book means matching left work undone.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        self.level(*side, *price)?.get(order_id)
    }

    #[must_use]
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        match side {
            Side::Buy => self.bids.get(&Reverse(price)),
            Side::Sell => self.asks.get(&price),
        }
    }

    /// Displayed quantity at one level; zero if the level does not exist.
    #[must_use]
    pub fn level_quantity(&self, side: Side, price: Price) -> Quantity {
        self.level(side, price)
            .map_or(Quantity::ZERO, PriceLevel::total_quantity)
    }

    /// Aggregated top `levels` of one side.
    #[must_use]
    pub fn depth(&self, side: Side, levels: usize) -> Vec<DepthLevel> {
        let aggregate = |level: &PriceLevel| DepthLevel {
            price: level.price,
            quantity: level.total_quantity(),
            orders: level.len(),
        };
        match side {
            Side::Buy => self.bids.values().take(levels).map(aggregate).collect(),
            Side::Sell => self.asks.values().take(levels).map(aggregate).collect(),
        }
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct bid price levels.
    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of distinct ask price levels.
    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }
}
