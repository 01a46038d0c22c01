//! Order types for the Tapeline matching engine.
//!
//! An [`OrderRequest`] is what a collaborator submits. Once it passes the
//! risk gate the exchange stamps an [`OrderId`] on it and it becomes an
//! [`Order`], the unit the book and the audit log deal in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ClientOrderId, OrderId, Price, Quantity, Symbol};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order, with its type-specific payload.
///
/// An OCO leg is a `Limit` or `Stop` order whose [`Order::linked_order`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    /// Inert until the last trade price crosses `trigger`. Becomes a limit
    /// order at [`Order::price`] when one is set, otherwise a market order.
    Stop { trigger: Price },
    /// Shows at most `display` lots; the rest is held in reserve.
    Iceberg { display: Quantity },
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
            Self::Stop { trigger } => write!(f, "STOP@{trigger}"),
            Self::Iceberg { display } => write!(f, "ICEBERG/{display}"),
        }
    }
}

/// How long an order stays live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Rests until filled or cancelled.
    GoodTillCancel,
    /// Unfilled remainder is cancelled immediately.
    ImmediateOrCancel,
    /// Fills completely on arrival or is rejected with no trades.
    FillOrKill,
    /// Rests until the given instant, then expires.
    GoodTillDate(DateTime<Utc>),
}

impl TimeInForce {
    /// Whether an unfilled remainder may rest on the book.
    #[must_use]
    pub const fn allows_resting(&self) -> bool {
        matches!(self, Self::GoodTillCancel | Self::GoodTillDate(_))
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    /// Stop order waiting for its trigger. Not on the book.
    PendingTrigger,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::PendingTrigger => write!(f, "PENDING_TRIGGER"),
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// An order intent as submitted by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub client_order_id: Option<ClientOrderId>,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price. `None` for market and stop-market orders.
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    /// Reject instead of taking liquidity.
    pub post_only: bool,
}

impl OrderRequest {
    #[must_use]
    pub fn limit(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            account_id,
            client_order_id: None,
            symbol,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            time_in_force: TimeInForce::GoodTillCancel,
            post_only: false,
        }
    }

    #[must_use]
    pub fn market(account_id: AccountId, symbol: Symbol, side: Side, quantity: Quantity) -> Self {
        Self {
            account_id,
            client_order_id: None,
            symbol,
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            time_in_force: TimeInForce::ImmediateOrCancel,
            post_only: false,
        }
    }

    /// Stop order; `limit = None` makes it a stop-market.
    #[must_use]
    pub fn stop(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        trigger: Price,
        limit: Option<Price>,
        quantity: Quantity,
    ) -> Self {
        Self {
            account_id,
            client_order_id: None,
            symbol,
            side,
            order_type: OrderType::Stop { trigger },
            price: limit,
            quantity,
            time_in_force: TimeInForce::GoodTillCancel,
            post_only: false,
        }
    }

    #[must_use]
    pub fn iceberg(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        display: Quantity,
    ) -> Self {
        Self {
            account_id,
            client_order_id: None,
            symbol,
            side,
            order_type: OrderType::Iceberg { display },
            price: Some(price),
            quantity,
            time_in_force: TimeInForce::GoodTillCancel,
            post_only: false,
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(ClientOrderId::new(id));
        self
    }

    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    #[must_use]
    pub fn with_post_only(mut self) -> Self {
        self.post_only = true;
        self
    }
}

/// What a cancel intent points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelTarget {
    Order(OrderId),
    Client {
        account_id: AccountId,
        client_order_id: ClientOrderId,
    },
}

impl std::fmt::Display for CancelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order(id) => write!(f, "order {id}"),
            Self::Client {
                account_id,
                client_order_id,
            } => write!(f, "client order {client_order_id} of {account_id}"),
        }
    }
}

/// Core order struct. Lives in the book while resting, in the pending-stop
/// set while waiting for a trigger, and in the audit log forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_order_id: Option<ClientOrderId>,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    /// Original total quantity.
    pub quantity: Quantity,
    /// Displayed, matchable quantity.
    pub remaining: Quantity,
    /// Iceberg reserve not yet displayed. Zero for every other type.
    pub hidden: Quantity,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub status: OrderStatus,
    /// Engine-assigned arrival sequence (time priority tie-breaker).
    pub arrival: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The sibling leg of an OCO pair.
    pub linked_order: Option<OrderId>,
}

impl Order {
    /// Stamp an accepted request with its exchange id.
    #[must_use]
    pub fn from_request(id: OrderId, request: &OrderRequest, now: DateTime<Utc>) -> Self {
        let (remaining, hidden) = match request.order_type {
            OrderType::Iceberg { display } => {
                let shown = display.min(request.quantity);
                (shown, request.quantity.saturating_sub(shown))
            }
            _ => (request.quantity, Quantity::ZERO),
        };
        Self {
            id,
            client_order_id: request.client_order_id.clone(),
            account_id: request.account_id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            quantity: request.quantity,
            remaining,
            hidden,
            time_in_force: request.time_in_force,
            post_only: request.post_only,
            status: OrderStatus::New,
            arrival: 0,
            created_at: now,
            updated_at: now,
            linked_order: None,
        }
    }

    /// Worst acceptable execution price; `None` means any price.
    #[must_use]
    pub fn limit_price(&self) -> Option<Price> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit | OrderType::Iceberg { .. } | OrderType::Stop { .. } => self.price,
        }
    }

    /// Whether this order, as an aggressor, would trade at `resting_price`.
    #[must_use]
    pub fn accepts(&self, resting_price: Price) -> bool {
        match (self.limit_price(), self.side) {
            (None, _) => true,
            (Some(limit), Side::Buy) => resting_price <= limit,
            (Some(limit), Side::Sell) => resting_price >= limit,
        }
    }

    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self.order_type, OrderType::Stop { .. })
    }

    #[must_use]
    pub const fn stop_trigger(&self) -> Option<Price> {
        match self.order_type {
            OrderType::Stop { trigger } => Some(trigger),
            _ => None,
        }
    }

    #[must_use]
    pub const fn display_size(&self) -> Option<Quantity> {
        match self.order_type {
            OrderType::Iceberg { display } => Some(display),
            _ => None,
        }
    }

    /// Displayed plus hidden quantity still to be traded.
    #[must_use]
    pub const fn open_quantity(&self) -> Quantity {
        self.remaining.saturating_add(self.hidden)
    }

    #[must_use]
    pub const fn filled(&self) -> Quantity {
        self.quantity.saturating_sub(self.open_quantity())
    }

    #[must_use]
    pub const fn is_filled(&self) -> bool {
        self.remaining.is_zero() && self.hidden.is_zero()
    }

    /// Whether an unmatched remainder of this order may rest on the book.
    #[must_use]
    pub fn can_rest(&self) -> bool {
        self.limit_price().is_some() && self.time_in_force.allows_resting()
    }

    /// Convert a triggered stop into the limit / market order it stands for.
    #[must_use]
    pub fn into_triggered(mut self) -> Self {
        if self.is_stop() {
            self.order_type = if self.price.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            };
            if self.order_type == OrderType::Market && self.time_in_force.allows_resting() {
                self.time_in_force = TimeInForce::ImmediateOrCancel;
            }
        }
        self
    }

    /// Price used to size the risk reservation of this order.
    #[must_use]
    pub fn reserve_price(&self) -> Option<Price> {
        self.price.or_else(|| self.stop_trigger())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: Side, price: Price, qty: Quantity) -> Self {
        let request = OrderRequest::limit(
            AccountId::new(),
            Symbol::new("BTC-USD"),
            side,
            price,
            qty,
        );
        Self::from_request(OrderId::new(), &request, Utc::now())
    }

    pub fn dummy_market(side: Side, qty: Quantity) -> Self {
        let request = OrderRequest::market(AccountId::new(), Symbol::new("BTC-USD"), side, qty);
        Self::from_request(OrderId::new(), &request, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_display_and_opposite() {
        assert_eq!(format!("{}", Side::Buy), "BUY");
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn iceberg_splits_display_and_reserve() {
        let req = OrderRequest::iceberg(
            AccountId::new(),
            Symbol::new("BTC-USD"),
            Side::Sell,
            Price(10),
            Quantity(1000),
            Quantity(100),
        );
        let order = Order::from_request(OrderId::new(), &req, Utc::now());
        assert_eq!(order.remaining, Quantity(100));
        assert_eq!(order.hidden, Quantity(900));
        assert_eq!(order.open_quantity(), Quantity(1000));
        assert_eq!(order.filled(), Quantity::ZERO);
    }

    #[test]
    fn accepts_respects_limit_direction() {
        let buy = Order::dummy_limit(Side::Buy, Price(100), Quantity(1));
        assert!(buy.accepts(Price(99)));
        assert!(buy.accepts(Price(100)));
        assert!(!buy.accepts(Price(101)));

        let sell = Order::dummy_limit(Side::Sell, Price(100), Quantity(1));
        assert!(sell.accepts(Price(101)));
        assert!(!sell.accepts(Price(99)));

        let market = Order::dummy_market(Side::Buy, Quantity(1));
        assert!(market.accepts(Price(u64::MAX)));
    }

    #[test]
    fn stop_converts_on_trigger() {
        let req = OrderRequest::stop(
            AccountId::new(),
            Symbol::new("BTC-USD"),
            Side::Sell,
            Price(95),
            None,
            Quantity(5),
        );
        let stop = Order::from_request(OrderId::new(), &req, Utc::now());
        assert_eq!(stop.stop_trigger(), Some(Price(95)));
        let market = stop.into_triggered();
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.time_in_force, TimeInForce::ImmediateOrCancel);

        let req = OrderRequest::stop(
            AccountId::new(),
            Symbol::new("BTC-USD"),
            Side::Buy,
            Price(105),
            Some(Price(106)),
            Quantity(5),
        );
        let limit = Order::from_request(OrderId::new(), &req, Utc::now()).into_triggered();
        assert_eq!(limit.order_type, OrderType::Limit);
        assert_eq!(limit.limit_price(), Some(Price(106)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::PendingTrigger.is_terminal());
    }

    #[test]
    fn ioc_cannot_rest() {
        let mut order = Order::dummy_limit(Side::Buy, Price(100), Quantity(1));
        assert!(order.can_rest());
        order.time_in_force = TimeInForce::ImmediateOrCancel;
        assert!(!order.can_rest());
    }
}
