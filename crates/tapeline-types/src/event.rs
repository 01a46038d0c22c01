//! Events emitted by the matcher and recorded by the audit log.
//!
//! [`EngineEvent`]s are derived state changes: they are produced by the
//! matching engine and can always be regenerated from the input events.
//! [`AuditEvent`] wraps them together with the inputs (accepted orders,
//! cancel requests, reference prices, halt overrides) that make a log replayable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, CancelTarget, ClientOrderId, Order, OrderId, OrderStatus, Price, Quantity, Side, Trade};

// ---------------------------------------------------------------------------
// Reason codes
// ---------------------------------------------------------------------------

/// Why an intent was rejected.
///
/// Codes follow the error classes: 1xx validation, 2xx state,
/// 3xx retryable, 9xx internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    // Validation (1xx)
    InvalidQuantity,
    MissingPrice,
    InvalidDisplaySize,
    BelowMinSize,
    AboveMaxSize,
    OffTick,
    PriceCollar,
    InsufficientBalance,
    OpenOrderLimit,
    PositionLimit,
    RateLimited,
    TradingDisabled,
    NotionalUnknown,
    SymbolMismatch,
    InvalidOco,
    AlreadyExpired,
    PostOnlyWouldCross,
    FillOrKillUnfilled,
    // State (2xx)
    DuplicateOrder,
    DuplicateClientOrderId,
    UnknownOrder,
    AlreadyTerminal,
    // Retryable (3xx)
    CircuitBreakerHalt,
    Busy,
    // Internal (9xx)
    SymbolFaulted,
}

impl RejectReason {
    /// Numeric reason code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::InvalidQuantity => 100,
            Self::MissingPrice => 101,
            Self::InvalidDisplaySize => 102,
            Self::BelowMinSize => 103,
            Self::AboveMaxSize => 104,
            Self::OffTick => 105,
            Self::PriceCollar => 106,
            Self::InsufficientBalance => 107,
            Self::OpenOrderLimit => 108,
            Self::PositionLimit => 109,
            Self::RateLimited => 110,
            Self::TradingDisabled => 111,
            Self::NotionalUnknown => 112,
            Self::SymbolMismatch => 113,
            Self::InvalidOco => 114,
            Self::AlreadyExpired => 115,
            Self::PostOnlyWouldCross => 116,
            Self::FillOrKillUnfilled => 117,
            Self::DuplicateOrder => 200,
            Self::DuplicateClientOrderId => 201,
            Self::UnknownOrder => 202,
            Self::AlreadyTerminal => 203,
            Self::CircuitBreakerHalt => 300,
            Self::Busy => 301,
            Self::SymbolFaulted => 900,
        }
    }

    /// Whether the same intent may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::CircuitBreakerHalt | Self::Busy | Self::RateLimited)
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Why a live order was taken off the book without being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    UserRequested,
    /// IOC remainder.
    ImmediateOrCancel,
    /// Market order ran out of acceptable liquidity.
    NoLiquidity,
    /// The other leg of its OCO pair completed.
    OcoSiblingDone,
    /// Good-till-date expiry passed.
    Expired,
}

/// Reason attached to a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReason {
    Rejected(RejectReason),
    Cancelled(CancelReason),
}

// ---------------------------------------------------------------------------
// Engine events
// ---------------------------------------------------------------------------

/// Snapshot of an order right after a status or quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub client_order_id: Option<ClientOrderId>,
    pub side: Side,
    pub price: Option<Price>,
    pub status: OrderStatus,
    /// Displayed quantity still open.
    pub remaining: Quantity,
    /// Iceberg reserve still open.
    pub hidden: Quantity,
    pub filled: Quantity,
    pub reason: Option<StatusReason>,
    pub at: DateTime<Utc>,
}

impl OrderUpdate {
    #[must_use]
    pub fn of(order: &Order, reason: Option<StatusReason>, at: DateTime<Utc>) -> Self {
        Self {
            order_id: order.id,
            account_id: order.account_id,
            client_order_id: order.client_order_id.clone(),
            side: order.side,
            price: order.price,
            status: order.status,
            remaining: order.remaining,
            hidden: order.hidden,
            filled: order.filled(),
            reason,
            at,
        }
    }

    /// Displayed plus hidden quantity.
    #[must_use]
    pub const fn open_quantity(&self) -> Quantity {
        self.remaining.saturating_add(self.hidden)
    }
}

/// A derived state change produced by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    OrderUpdated(OrderUpdate),
    Trade(Trade),
    StopTriggered {
        order_id: OrderId,
        trigger: Price,
        last_price: Price,
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
    CancelRejected {
        target: CancelTarget,
        reason: RejectReason,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    #[must_use]
    pub const fn as_trade(&self) -> Option<&Trade> {
        match self {
            Self::Trade(trade) => Some(trade),
            _ => None,
        }
    }
}

/// Change of one displayed price level. `quantity` is the new displayed
/// total; zero means the level is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDelta {
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// Everything the audit log records for a symbol.
///
/// The first five variants are inputs and carry the timestamp the engine
/// processed them at; replaying them in order through a fresh engine
/// reproduces every [`AuditEvent::Engine`] record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    Accepted {
        order: Order,
        at: DateTime<Utc>,
    },
    OcoAccepted {
        first: Order,
        second: Order,
        at: DateTime<Utc>,
    },
    CancelRequested {
        target: CancelTarget,
        at: DateTime<Utc>,
    },
    ReferencePrice {
        price: Price,
        at: DateTime<Utc>,
    },
    /// Operator lifted a circuit-breaker halt before its cool-down.
    ResumeRequested {
        at: DateTime<Utc>,
    },
    /// Pre-trade risk rejection. Never reaches the engine.
    Rejected {
        order: Order,
        reason: RejectReason,
        at: DateTime<Utc>,
    },
    Engine(EngineEvent),
}

impl AuditEvent {
    /// Whether replay feeds this event into the engine.
    #[must_use]
    pub const fn is_engine_input(&self) -> bool {
        matches!(
            self,
            Self::Accepted { .. }
                | Self::OcoAccepted { .. }
                | Self::CancelRequested { .. }
                | Self::ReferencePrice { .. }
                | Self::ResumeRequested { .. }
        )
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::OcoAccepted { .. } => "oco_accepted",
            Self::CancelRequested { .. } => "cancel_requested",
            Self::ReferencePrice { .. } => "reference_price",
            Self::ResumeRequested { .. } => "resume_requested",
            Self::Rejected { .. } => "rejected",
            Self::Engine(EngineEvent::OrderUpdated(_)) => "order_updated",
            Self::Engine(EngineEvent::Trade(_)) => "trade",
            Self::Engine(EngineEvent::StopTriggered { .. }) => "stop_triggered",
            Self::Engine(EngineEvent::Halted { .. }) => "halted",
            Self::Engine(EngineEvent::Resumed { .. }) => "resumed",
            Self::Engine(EngineEvent::CancelRejected { .. }) => "cancel_rejected",
        }
    }
}

impl From<EngineEvent> for AuditEvent {
    fn from(event: EngineEvent) -> Self {
        Self::Engine(event)
    }
}
