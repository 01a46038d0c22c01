//! Messages exchanged between the exchange front, the symbol actors and the
//! audit writers, plus the reports handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapeline_audit::AuditRecord;
use tapeline_matchcore::{BookSnapshot, Outcome};
use tapeline_types::{
    AuditEvent, CancelTarget, EngineEvent, Order, OrderId, OrderStatus, OrderUpdate, Price, Quantity,
    RejectReason, Result, StatusReason, Trade,
};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Intents and queries served by a symbol actor, one at a time.
#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        order: Order,
        reply: Reply<Committed>,
    },
    SubmitOco {
        first: Order,
        second: Order,
        reply: Reply<Committed>,
    },
    Cancel {
        target: CancelTarget,
        reply: Reply<Committed>,
    },
    ReferencePrice {
        price: Price,
        reply: Reply<Committed>,
    },
    Resume {
        reply: Reply<Committed>,
    },
    Snapshot {
        depth: usize,
        reply: oneshot::Sender<BookSnapshot>,
    },
    Status {
        reply: oneshot::Sender<SymbolStatus>,
    },
    Recover {
        reply: Reply<RecoveryReport>,
    },
}

/// Work for the audit writer.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// Append `input` then every event of `outcome`, persist, publish,
    /// feed risk, reply.
    Commit {
        input: AuditEvent,
        outcome: Outcome,
        at: DateTime<Utc>,
        reply: Reply<Committed>,
    },
    /// Every record with `sequence >= from`.
    Records {
        from: u64,
        reply: oneshot::Sender<Vec<AuditRecord>>,
    },
}

/// An intent that made it into the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Sequence of the input record.
    pub sequence: u64,
    /// Sequence of the last record the intent produced.
    pub last_sequence: u64,
    pub outcome: Outcome,
}

/// Answer to an order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReport {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub reason: Option<StatusReason>,
    pub filled: Quantity,
    pub trades: Vec<Trade>,
    /// Sequence of the audit record that admitted or rejected the order.
    pub audit_sequence: u64,
}

impl SubmitReport {
    pub(crate) fn from_committed(order_id: OrderId, committed: &Committed) -> Self {
        let update = committed.outcome.final_update(order_id);
        Self {
            order_id,
            status: update.map_or(OrderStatus::New, |u| u.status),
            reason: update.and_then(|u| u.reason),
            filled: update.map_or(Quantity::ZERO, |u| u.filled),
            trades: committed.outcome.trades().cloned().collect(),
            audit_sequence: committed.sequence,
        }
    }

    pub(crate) fn risk_rejected(order_id: OrderId, reason: RejectReason, audit_sequence: u64) -> Self {
        Self {
            order_id,
            status: OrderStatus::Rejected,
            reason: Some(StatusReason::Rejected(reason)),
            filled: Quantity::ZERO,
            trades: Vec::new(),
            audit_sequence,
        }
    }

    /// The rejection reason, if the order was rejected.
    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.reason {
            Some(StatusReason::Rejected(reason)) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status == OrderStatus::Rejected
    }
}

/// Answer to an OCO submission: one report per leg, sharing trades and
/// audit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoReport {
    pub first: SubmitReport,
    pub second: SubmitReport,
}

impl OcoReport {
    pub(crate) fn from_committed(first: OrderId, second: OrderId, committed: &Committed) -> Self {
        Self {
            first: SubmitReport::from_committed(first, committed),
            second: SubmitReport::from_committed(second, committed),
        }
    }

    pub(crate) fn risk_rejected(first: OrderId, second: OrderId, reason: RejectReason, seq: u64) -> Self {
        Self {
            first: SubmitReport::risk_rejected(first, reason, seq),
            second: SubmitReport::risk_rejected(second, reason, seq),
        }
    }

    /// Trades produced while admitting the pair.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.first.trades
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReport {
    pub target: CancelTarget,
    /// Status of the target after the intent, when it is known.
    pub status: Option<OrderStatus>,
    /// Set when the cancel was a no-op (`AlreadyTerminal`, `UnknownOrder`).
    pub rejected: Option<RejectReason>,
    pub audit_sequence: u64,
}

impl CancelReport {
    pub(crate) fn from_committed(target: CancelTarget, committed: &Committed) -> Self {
        let status = committed.outcome.events.iter().find_map(|event| match event {
            EngineEvent::OrderUpdated(update) if targets(&target, update) => {
                Some(update.status)
            }
            _ => None,
        });
        Self {
            rejected: committed.outcome.cancel_rejection(),
            status,
            target,
            audit_sequence: committed.sequence,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == Some(OrderStatus::Cancelled)
    }
}

fn targets(target: &CancelTarget, update: &OrderUpdate) -> bool {
    match target {
        CancelTarget::Order(id) => update.order_id == *id,
        CancelTarget::Client {
            account_id,
            client_order_id,
        } => update.account_id == *account_id && update.client_order_id.as_ref() == Some(client_order_id),
    }
}

/// Health of one symbol actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStatus {
    pub faulted: bool,
    pub fault_reason: Option<String>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub last_trade_price: Option<Price>,
    pub pending_stops: usize,
    pub halted: bool,
}

/// Result of rebuilding a symbol from its audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub records: usize,
    pub inputs: usize,
    pub trades: usize,
    pub last_sequence: u64,
    /// Hex book digest of the rebuilt engine.
    pub book_digest: String,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tapeline_types::*;

    use super::*;

    fn committed(events: Vec<EngineEvent>) -> Committed {
        Committed {
            sequence: 7,
            last_sequence: 7 + events.len() as u64,
            outcome: Outcome {
                events,
                deltas: Vec::new(),
            },
        }
    }

    #[test]
    fn submit_report_uses_last_update() {
        let mut order = Order::dummy_limit(Side::Buy, Price(100), Quantity(10));
        order.status = OrderStatus::Open;
        let open = OrderUpdate::of(&order, None, Utc::now());
        order.status = OrderStatus::Cancelled;
        let done = OrderUpdate::of(
            &order,
            Some(StatusReason::Cancelled(CancelReason::ImmediateOrCancel)),
            Utc::now(),
        );
        let report = SubmitReport::from_committed(
            order.id,
            &committed(vec![EngineEvent::OrderUpdated(open), EngineEvent::OrderUpdated(done)]),
        );
        assert_eq!(report.status, OrderStatus::Cancelled);
        assert_eq!(report.audit_sequence, 7);
        assert!(report.reject_reason().is_none());
        assert!(report.trades.is_empty());
    }

    #[test]
    fn risk_rejection_report() {
        let id = OrderId::new();
        let report = SubmitReport::risk_rejected(id, RejectReason::PriceCollar, 3);
        assert!(report.is_rejected());
        assert_eq!(report.reject_reason(), Some(RejectReason::PriceCollar));
        assert_eq!(report.audit_sequence, 3);
    }

    #[test]
    fn cancel_report_of_terminal_target() {
        let target = CancelTarget::Order(OrderId::new());
        let report = CancelReport::from_committed(
            target.clone(),
            &committed(vec![EngineEvent::CancelRejected {
                target: target.clone(),
                reason: RejectReason::AlreadyTerminal,
                at: Utc::now(),
            }]),
        );
        assert_eq!(report.rejected, Some(RejectReason::AlreadyTerminal));
        assert!(report.status.is_none());
        assert!(!report.is_cancelled());
    }
}
