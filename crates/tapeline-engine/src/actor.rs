//! Per-symbol actor.
//!
//! Owns the symbol's [`MatchingEngine`] outright and serves one command
//! at a time from a bounded queue. Accepted intents are handed to the
//! audit writer together with the caller's reply, so the caller hears
//! back only once the records are stored.

use chrono::{DateTime, Utc};
use tapeline_audit::{apply_input, replay};
use tapeline_matchcore::{BreakerState, MatchingEngine, digest_hex};
use tapeline_types::{AuditEvent, Result, Symbol, TapelineError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{Command, Committed, RecoveryReport, Reply, SymbolStatus, WriterCommand};

pub(crate) struct SymbolActor {
    engine: MatchingEngine,
    audit: mpsc::Sender<WriterCommand>,
    /// Latest timestamp handed to the engine. Time never runs backwards
    /// within a symbol.
    clock: DateTime<Utc>,
}

impl SymbolActor {
    pub(crate) fn new(engine: MatchingEngine, audit: mpsc::Sender<WriterCommand>) -> Self {
        Self {
            engine,
            audit,
            clock: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub(crate) fn spawn(self, commands: mpsc::Receiver<Command>) -> JoinHandle<()> {
        tokio::spawn(self.run(commands))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(symbol = %self.symbol(), "symbol actor started");
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        info!(symbol = %self.symbol(), "symbol actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { order, reply } => {
                let at = self.now();
                self.intent(AuditEvent::Accepted { order, at }, at, reply).await;
            }
            Command::SubmitOco {
                first,
                second,
                reply,
            } => {
                let at = self.now();
                self.intent(AuditEvent::OcoAccepted { first, second, at }, at, reply)
                    .await;
            }
            Command::Cancel { target, reply } => {
                let at = self.now();
                self.intent(AuditEvent::CancelRequested { target, at }, at, reply)
                    .await;
            }
            Command::ReferencePrice { price, reply } => {
                let at = self.now();
                self.intent(AuditEvent::ReferencePrice { price, at }, at, reply)
                    .await;
            }
            Command::Resume { reply } => {
                let at = self.now();
                self.intent(AuditEvent::ResumeRequested { at }, at, reply).await;
            }
            Command::Snapshot { depth, reply } => {
                let _ = reply.send(self.engine.snapshot(depth));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Recover { reply } => {
                let result = self.recover().await;
                let _ = reply.send(result);
            }
        }
    }

    /// Run one input through the engine and pass the outcome to the
    /// writer. `Busy` when the writer is at its watermark.
    async fn intent(&mut self, input: AuditEvent, at: DateTime<Utc>, reply: Reply<Committed>) {
        if self.audit.capacity() == 0 {
            warn!(symbol = %self.symbol(), kind = input.kind(), "audit writer at watermark, busy");
            let _ = reply.send(Err(TapelineError::Busy));
            return;
        }

        let outcome = match apply_input(&mut self.engine, &input) {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_fatal() {
                    error!(symbol = %self.symbol(), error = %e, "symbol faulted, awaiting recovery");
                } else {
                    debug!(symbol = %self.symbol(), error = %e, "intent refused");
                }
                let _ = reply.send(Err(e));
                return;
            }
        };

        let command = WriterCommand::Commit {
            input,
            outcome,
            at,
            reply,
        };
        if let Err(mpsc::error::SendError(command)) = self.audit.send(command).await {
            error!(symbol = %self.symbol(), "audit writer gone");
            if let WriterCommand::Commit { reply, .. } = command {
                let _ = reply.send(Err(TapelineError::ChannelClosed(format!(
                    "audit writer for {}",
                    self.symbol()
                ))));
            }
        }
    }

    /// Rebuild the engine from the writer's log and swap it in.
    async fn recover(&mut self) -> Result<RecoveryReport> {
        let closed = || TapelineError::ChannelClosed(format!("audit writer for {}", self.symbol()));
        let (reply, records) = oneshot::channel();
        self.audit
            .send(WriterCommand::Records { from: 1, reply })
            .await
            .map_err(|_| closed())?;
        let records = records.await.map_err(|_| closed())?;

        let was_faulted = self.engine.is_faulted();
        let rebuilt = replay(&records, self.engine.config())?;
        let report = RecoveryReport {
            records: records.len(),
            inputs: rebuilt.inputs,
            trades: rebuilt.trades.len(),
            last_sequence: rebuilt.last_sequence,
            book_digest: digest_hex(&rebuilt.book_digest),
        };
        self.engine = rebuilt.engine;
        info!(
            symbol = %self.symbol(),
            was_faulted,
            records = report.records,
            last_sequence = report.last_sequence,
            digest = %report.book_digest,
            "symbol recovered from audit log"
        );
        Ok(report)
    }

    fn status(&self) -> SymbolStatus {
        SymbolStatus {
            faulted: self.engine.is_faulted(),
            fault_reason: self.engine.fault_reason().map(str::to_owned),
            best_bid: self.engine.best_bid(),
            best_ask: self.engine.best_ask(),
            last_trade_price: self.engine.last_trade_price(),
            pending_stops: self.engine.pending_stops(),
            halted: matches!(self.engine.breaker_state(), BreakerState::Halted { .. }),
        }
    }

    fn now(&mut self) -> DateTime<Utc> {
        self.clock = self.clock.max(Utc::now());
        self.clock
    }

    fn symbol(&self) -> &Symbol {
        self.engine.symbol()
    }
}
