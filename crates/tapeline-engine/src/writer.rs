//! Per-symbol audit writer.
//!
//! Runs on its own thread and drains a bounded channel with
//! `blocking_recv`, so the synchronous store never stalls the async
//! runtime. For each committed intent, in this order:
//!
//! 1. append the input record, then one record per engine event
//! 2. feed fills, status changes and reference prices back to risk
//! 3. persist the new records through the [`AuditStore`]
//! 4. publish market data tagged with the records' sequences
//! 5. acknowledge the caller
//!
//! Market data for records the store has not accepted is held back and
//! published, in sequence order, after a later persist succeeds.
//!
//! The channel bound is the backpressure watermark: the symbol actor
//! answers `Busy` instead of queueing once it is full.

use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use tapeline_audit::{AuditLog, AuditStore};
use tapeline_ingress::RiskValidator;
use tapeline_matchcore::Outcome;
use tapeline_types::{AuditEvent, EngineEvent, Result, TapelineError};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::command::{Committed, WriterCommand};
use crate::market_data::{MarketData, MarketDataPublisher};

pub(crate) struct AuditWriter {
    log: AuditLog,
    store: Box<dyn AuditStore>,
    publisher: MarketDataPublisher,
    risk: Arc<RiskValidator>,
    /// Highest sequence known to be in the store.
    persisted: u64,
    /// Market data waiting for its records to be stored.
    unpublished: Vec<(u64, MarketData)>,
}

impl AuditWriter {
    /// `log` must already hold everything `store` holds.
    pub(crate) fn new(
        log: AuditLog,
        store: Box<dyn AuditStore>,
        publisher: MarketDataPublisher,
        risk: Arc<RiskValidator>,
    ) -> Self {
        Self {
            persisted: log.last_sequence(),
            log,
            store,
            publisher,
            risk,
            unpublished: Vec::new(),
        }
    }

    pub(crate) fn spawn(self, receiver: mpsc::Receiver<WriterCommand>) -> Result<JoinHandle<()>> {
        let name = format!("audit-{}", self.log.symbol());
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run(receiver))
            .map_err(TapelineError::from)
    }

    fn run(mut self, mut receiver: mpsc::Receiver<WriterCommand>) {
        info!(symbol = %self.log.symbol(), head = self.log.last_sequence(), "audit writer started");
        while let Some(command) = receiver.blocking_recv() {
            match command {
                WriterCommand::Commit {
                    input,
                    outcome,
                    at,
                    reply,
                } => {
                    let result = self.commit(input, outcome, at);
                    // The caller may have given up; the record stands regardless.
                    let _ = reply.send(result);
                }
                WriterCommand::Records { from, reply } => {
                    let _ = reply.send(self.log.records_from(from).to_vec());
                }
            }
        }
        if let Err(e) = self.flush() {
            error!(symbol = %self.log.symbol(), error = %e, "final audit flush failed");
        }
        info!(symbol = %self.log.symbol(), head = self.log.last_sequence(), "audit writer stopped");
    }

    fn commit(&mut self, input: AuditEvent, outcome: Outcome, at: DateTime<Utc>) -> Result<Committed> {
        let symbol = self.log.symbol().clone();
        let sequence = self.log.append(input.clone(), at)?;
        for event in &outcome.events {
            self.log.append(AuditEvent::Engine(event.clone()), at)?;
        }
        let last_sequence = self.log.last_sequence();
        debug!(%symbol, sequence, last_sequence, kind = input.kind(), "intent committed");

        // The book has already moved, so risk follows it whether or not the
        // store accepts the records. The reference comes before any fills
        // it triggered.
        if let AuditEvent::ReferencePrice { price, .. } = &input {
            self.risk.on_reference_price(&symbol, *price);
        }
        for (offset, event) in (1..).zip(&outcome.events) {
            if let Some(data) = MarketData::from_engine(event) {
                self.unpublished.push((sequence + offset, data));
            }
            match event {
                EngineEvent::Trade(trade) => self.risk.on_fill(trade),
                EngineEvent::OrderUpdated(update) => self.risk.on_order_update(update),
                _ => {}
            }
        }
        if !outcome.deltas.is_empty() {
            self.unpublished.push((last_sequence, MarketData::Book(outcome.deltas.clone())));
        }

        self.flush()?;
        Ok(Committed {
            sequence,
            last_sequence,
            outcome,
        })
    }

    /// Persist every record not yet in the store, then release the
    /// market data that was waiting on them.
    fn flush(&mut self) -> Result<()> {
        let pending = self.log.records_from(self.persisted + 1);
        if !pending.is_empty() {
            if let Err(e) = self.store.persist(pending) {
                error!(
                    symbol = %self.log.symbol(),
                    from = self.persisted + 1,
                    count = pending.len(),
                    held = self.unpublished.len(),
                    error = %e,
                    "audit persist failed"
                );
                return Err(e);
            }
            self.persisted = self.log.last_sequence();
        }
        for (sequence, data) in self.unpublished.drain(..) {
            self.publisher.publish(sequence, data);
        }
        Ok(())
    }
}
