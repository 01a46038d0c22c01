//! Multi-symbol front door.
//!
//! ```text
//! OrderRequest
//!   → Exchange.submit()
//!     → RiskValidator.validate()        (shared, per-account DashMap)
//!       → Rejected → audit `Rejected` record, report
//!       → Approved → symbol actor queue
//!         → MatchingEngine
//!         → audit writer: append, persist, publish, risk feedback
//!         → SubmitReport
//! ```
//!
//! Symbols share nothing but the risk validator.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tapeline_audit::{AuditLog, AuditRecord, AuditStore, JsonLinesStore, MemoryStore, replay};
use tapeline_ingress::RiskValidator;
use tapeline_matchcore::{BookSnapshot, MatchingEngine, Outcome, digest_hex};
use tapeline_types::{
    AccountId, AuditEvent, CancelTarget, ClientOrderId, ExchangeConfig, LedgerSnapshot, Order,
    OrderId, OrderRequest, Price, RejectReason, Result, RiskDecision, Symbol, SymbolConfig,
    TapelineError, constants,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::actor::SymbolActor;
use crate::command::{
    CancelReport, Command, Committed, OcoReport, RecoveryReport, SubmitReport, SymbolStatus,
    WriterCommand,
};
use crate::market_data::{MarketDataPublisher, Subscription};
use crate::writer::AuditWriter;

/// Cancel intent addressed to a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub symbol: Symbol,
    pub target: CancelTarget,
}

impl CancelRequest {
    #[must_use]
    pub fn by_id(symbol: Symbol, order_id: OrderId) -> Self {
        Self {
            symbol,
            target: CancelTarget::Order(order_id),
        }
    }

    #[must_use]
    pub fn by_client_id(symbol: Symbol, account_id: AccountId, client_order_id: impl Into<String>) -> Self {
        Self {
            symbol,
            target: CancelTarget::Client {
                account_id,
                client_order_id: ClientOrderId::new(client_order_id),
            },
        }
    }
}

struct SymbolHandle {
    commands: mpsc::Sender<Command>,
    audit: mpsc::Sender<WriterCommand>,
    publisher: MarketDataPublisher,
    actor: tokio::task::JoinHandle<()>,
    writer: std::thread::JoinHandle<()>,
}

pub struct Exchange {
    symbols: HashMap<Symbol, SymbolHandle>,
    risk: Arc<RiskValidator>,
}

impl Exchange {
    /// Start one actor and one audit writer per configured symbol, keeping
    /// audit records in memory. Must be called inside a tokio runtime.
    pub fn start(config: &ExchangeConfig) -> Result<Self> {
        Self::start_with_stores(config, |_| Ok(Box::new(MemoryStore::new()) as Box<dyn AuditStore>))
    }

    /// Like [`Exchange::start`], with each symbol's audit log in
    /// `dir/<symbol>.jsonl`.
    pub fn start_with_audit_dir(config: &ExchangeConfig, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        Self::start_with_stores(config, move |symbol| {
            let store = JsonLinesStore::open(dir.join(format!("{symbol}.jsonl")))?;
            Ok(Box::new(store) as Box<dyn AuditStore>)
        })
    }

    /// Start with one store per symbol from `open_store`. Whatever a store
    /// already holds is verified and replayed first, so a restarted
    /// exchange resumes with the book it had.
    pub fn start_with_stores<F>(config: &ExchangeConfig, mut open_store: F) -> Result<Self>
    where
        F: FnMut(&Symbol) -> Result<Box<dyn AuditStore>>,
    {
        config.validate()?;
        let risk = Arc::new(RiskValidator::new(config.risk.clone(), config.symbols.iter().cloned()));

        let mut symbols = HashMap::with_capacity(config.symbols.len());
        for symbol_config in &config.symbols {
            let store = open_store(&symbol_config.symbol)?;
            let handle = Self::launch_symbol(symbol_config, config, store, &risk)?;
            symbols.insert(symbol_config.symbol.clone(), handle);
        }
        info!(
            symbols = symbols.len(),
            "{} {} started",
            constants::ENGINE_NAME,
            constants::VERSION
        );
        Ok(Self { symbols, risk })
    }

    fn launch_symbol(
        symbol_config: &SymbolConfig,
        config: &ExchangeConfig,
        store: Box<dyn AuditStore>,
        risk: &Arc<RiskValidator>,
    ) -> Result<SymbolHandle> {
        let symbol = symbol_config.symbol.clone();
        let records = store.load()?;

        let engine = if records.is_empty() {
            MatchingEngine::new(symbol_config.clone())
        } else {
            let restored = replay(&records, symbol_config)?;
            info!(
                %symbol,
                records = records.len(),
                trades = restored.trades.len(),
                digest = %digest_hex(&restored.book_digest),
                "symbol restored from audit log"
            );
            restored.engine
        };
        if let Some(price) = engine.last_trade_price() {
            risk.on_reference_price(&symbol, price);
        }

        let log = AuditLog::from_records(symbol.clone(), records)?;
        let publisher = MarketDataPublisher::new(symbol.clone(), config.runtime.market_data_capacity);

        let (audit_tx, audit_rx) = mpsc::channel(config.runtime.audit_watermark);
        let writer = AuditWriter::new(log, store, publisher.clone(), Arc::clone(risk)).spawn(audit_rx)?;

        let (command_tx, command_rx) = mpsc::channel(config.runtime.command_queue_depth);
        let actor = SymbolActor::new(engine, audit_tx.clone()).spawn(command_rx);

        Ok(SymbolHandle {
            commands: command_tx,
            audit: audit_tx,
            publisher,
            actor,
            writer,
        })
    }

    // =================================================================
    // Intents
    // =================================================================

    /// Risk-check and submit one order.
    ///
    /// Risk rejections come back as a `Rejected` report and are audited.
    /// `Busy`, a faulted symbol or an unknown symbol come back as errors.
    pub async fn submit(&self, request: OrderRequest) -> Result<SubmitReport> {
        let handle = self.handle(&request.symbol)?;
        let now = Utc::now();
        let order = Order::from_request(OrderId::new(), &request, now);

        if let RiskDecision::Rejected { reason } = self.risk.validate(&order, now) {
            let id = order.id;
            let sequence = Self::audit_rejection(handle, order, reason).await?;
            return Ok(SubmitReport::risk_rejected(id, reason, sequence));
        }

        let (reply, answer) = oneshot::channel();
        let result = Self::call(
            handle,
            Command::Submit {
                order: order.clone(),
                reply,
            },
            answer,
        )
        .await;
        match result {
            Ok(committed) => Ok(SubmitReport::from_committed(order.id, &committed)),
            Err(e) => {
                self.release_unbooked(&e, &[&order]);
                Err(e)
            }
        }
    }

    /// Submit two linked legs for the same symbol and account.
    pub async fn submit_oco(&self, first: OrderRequest, second: OrderRequest) -> Result<OcoReport> {
        if first.symbol != second.symbol {
            return Err(TapelineError::InvalidOrder {
                reason: format!("oco legs on {} and {}", first.symbol, second.symbol),
            });
        }
        let handle = self.handle(&first.symbol)?;
        let now = Utc::now();
        let first = Order::from_request(OrderId::new(), &first, now);
        let second = Order::from_request(OrderId::new(), &second, now);

        if let RiskDecision::Rejected { reason } = self.risk.validate_oco(&first, &second, now) {
            let (first_id, second_id) = (first.id, second.id);
            let sequence = Self::audit_rejection(handle, first, reason).await?;
            Self::audit_rejection(handle, second, reason).await?;
            return Ok(OcoReport::risk_rejected(first_id, second_id, reason, sequence));
        }

        let (reply, answer) = oneshot::channel();
        let result = Self::call(
            handle,
            Command::SubmitOco {
                first: first.clone(),
                second: second.clone(),
                reply,
            },
            answer,
        )
        .await;
        match result {
            Ok(committed) => Ok(OcoReport::from_committed(first.id, second.id, &committed)),
            Err(e) => {
                self.release_unbooked(&e, &[&first, &second]);
                Err(e)
            }
        }
    }

    /// Cancel a live order. Cancelling a terminal order is a no-op whose
    /// report carries `AlreadyTerminal`.
    pub async fn cancel(&self, request: CancelRequest) -> Result<CancelReport> {
        let handle = self.handle(&request.symbol)?;
        let (reply, answer) = oneshot::channel();
        let committed = Self::call(
            handle,
            Command::Cancel {
                target: request.target.clone(),
                reply,
            },
            answer,
        )
        .await?;
        Ok(CancelReport::from_committed(request.target, &committed))
    }

    /// External reference price for `symbol`. May trigger stops.
    pub async fn update_reference_price(&self, symbol: &Symbol, price: Price) -> Result<Committed> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        Self::call(handle, Command::ReferencePrice { price, reply }, answer).await
    }

    /// Lift a circuit-breaker halt on `symbol` before its cool-down ends.
    /// Audited like any other intent; a no-op when trading is not halted.
    pub async fn resume_trading(&self, symbol: &Symbol) -> Result<Committed> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        Self::call(handle, Command::Resume { reply }, answer).await
    }

    /// Authoritative balances and positions from the ledger.
    pub fn apply_ledger_snapshot(&self, snapshot: &LedgerSnapshot) {
        self.risk.apply_ledger_snapshot(snapshot);
    }

    /// Rebuild `symbol` from its audit log, clearing a fault.
    pub async fn recover(&self, symbol: &Symbol) -> Result<RecoveryReport> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        Self::call(handle, Command::Recover { reply }, answer).await
    }

    // =================================================================
    // Queries
    // =================================================================

    pub async fn snapshot(&self, symbol: &Symbol, depth: usize) -> Result<BookSnapshot> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        Self::query(handle, Command::Snapshot { depth, reply }, answer).await
    }

    pub async fn status(&self, symbol: &Symbol) -> Result<SymbolStatus> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        Self::query(handle, Command::Status { reply }, answer).await
    }

    /// Audit records of `symbol` with `sequence >= from`.
    pub async fn audit_records(&self, symbol: &Symbol, from: u64) -> Result<Vec<AuditRecord>> {
        let handle = self.handle(symbol)?;
        let (reply, answer) = oneshot::channel();
        handle
            .audit
            .send(WriterCommand::Records { from, reply })
            .await
            .map_err(|_| writer_gone(symbol))?;
        answer.await.map_err(|_| writer_gone(symbol))
    }

    pub fn subscribe(&self, symbol: &Symbol) -> Result<Subscription> {
        Ok(self.handle(symbol)?.publisher.subscribe())
    }

    /// Free slots in the symbol's audit queue. Zero means new intents are
    /// answered `Busy`.
    pub fn audit_headroom(&self, symbol: &Symbol) -> Result<usize> {
        Ok(self.handle(symbol)?.audit.capacity())
    }

    #[must_use]
    pub fn risk(&self) -> &RiskValidator {
        &self.risk
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.keys()
    }

    /// Stop every actor, let the writers drain, and wait for both.
    pub async fn shutdown(self) -> Result<()> {
        for (symbol, handle) in self.symbols {
            let SymbolHandle {
                commands,
                audit,
                publisher,
                actor,
                writer,
            } = handle;
            drop(commands);
            if let Err(e) = actor.await {
                error!(%symbol, error = %e, "symbol actor ended abnormally");
            }
            drop(audit);
            drop(publisher);
            tokio::task::spawn_blocking(move || writer.join())
                .await
                .map_err(|e| TapelineError::Internal(e.to_string()))?
                .map_err(|_| TapelineError::Internal(format!("audit writer for {symbol} panicked")))?;
        }
        info!("exchange stopped");
        Ok(())
    }

    // =================================================================
    // Internals
    // =================================================================

    fn handle(&self, symbol: &Symbol) -> Result<&SymbolHandle> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| TapelineError::UnknownSymbol(symbol.clone()))
    }

    async fn call<T>(handle: &SymbolHandle, command: Command, answer: oneshot::Receiver<Result<T>>) -> Result<T> {
        handle
            .commands
            .send(command)
            .await
            .map_err(|_| TapelineError::ChannelClosed("symbol actor".into()))?;
        answer
            .await
            .map_err(|_| TapelineError::ChannelClosed("symbol actor dropped reply".into()))?
    }

    async fn query<T>(handle: &SymbolHandle, command: Command, answer: oneshot::Receiver<T>) -> Result<T> {
        handle
            .commands
            .send(command)
            .await
            .map_err(|_| TapelineError::ChannelClosed("symbol actor".into()))?;
        answer
            .await
            .map_err(|_| TapelineError::ChannelClosed("symbol actor dropped reply".into()))
    }

    /// Write a risk rejection straight to the audit writer. It waits for
    /// room instead of answering `Busy`: rejections are never dropped.
    async fn audit_rejection(handle: &SymbolHandle, order: Order, reason: RejectReason) -> Result<u64> {
        let symbol = order.symbol.clone();
        let at = Utc::now();
        let (reply, answer) = oneshot::channel();
        handle
            .audit
            .send(WriterCommand::Commit {
                input: AuditEvent::Rejected { order, reason, at },
                outcome: Outcome::default(),
                at,
                reply,
            })
            .await
            .map_err(|_| writer_gone(&symbol))?;
        let committed = answer.await.map_err(|_| writer_gone(&symbol))??;
        Ok(committed.sequence)
    }

    /// Orders the engine never booked give their reservation back. A
    /// failed persist is the exception: the book has already moved.
    fn release_unbooked(&self, error: &TapelineError, orders: &[&Order]) {
        if matches!(error, TapelineError::Io(_)) {
            return;
        }
        for order in orders {
            self.risk.release(order);
            warn!(order_id = %order.id, %error, "intent not booked, reservation released");
        }
    }
}

fn writer_gone(symbol: &Symbol) -> TapelineError {
    TapelineError::ChannelClosed(format!("audit writer for {symbol}"))
}
