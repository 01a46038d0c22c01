//! Deterministic replay of an audit log.
//!
//! The input records (`Accepted`, `OcoAccepted`, `CancelRequested`,
//! `ReferencePrice`, `ResumeRequested`) are fed, with their recorded
//! timestamps, into a fresh [`MatchingEngine`]. Every derived record that
//! follows an input must be reproduced exactly, in order, before the next
//! input is fed. Risk rejections never reached the engine and are skipped.

use std::collections::VecDeque;

use tapeline_matchcore::{MatchingEngine, Outcome, book_digest, compute_trade_root};
use tapeline_types::{AuditEvent, EngineEvent, Result, SymbolConfig, TapelineError, Trade};
use tracing::info;

use crate::record::{AuditRecord, verify_records};

/// What a successful replay rebuilt.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub engine: MatchingEngine,
    pub trades: Vec<Trade>,
    pub book_digest: [u8; 32],
    pub trade_root: [u8; 32],
    /// Input records fed to the engine.
    pub inputs: usize,
    pub last_sequence: u64,
}

/// Rebuild the engine for `config.symbol` from `records`.
pub fn replay(records: &[AuditRecord], config: &SymbolConfig) -> Result<ReplayOutcome> {
    verify_records(records)?;

    let mut engine = MatchingEngine::new(config.clone());
    let mut pending: VecDeque<EngineEvent> = VecDeque::new();
    let mut trades = Vec::new();
    let mut inputs = 0;

    for record in records {
        let sequence = record.sequence;
        if record.symbol != config.symbol {
            return Err(divergence(sequence, format!("record for {}", record.symbol)));
        }

        let outcome = match &record.event {
            AuditEvent::Engine(recorded) => {
                match pending.pop_front() {
                    Some(derived) if &derived == recorded => {}
                    Some(derived) => {
                        return Err(divergence(
                            sequence,
                            format!("recorded {recorded:?}, replay produced {derived:?}"),
                        ));
                    }
                    None => {
                        return Err(divergence(sequence, format!("unexpected {recorded:?}")));
                    }
                }
                continue;
            }
            AuditEvent::Rejected { .. } => continue,
            input => {
                if let Some(missing) = pending.front() {
                    return Err(divergence(sequence, format!("log is missing {missing:?}")));
                }
                inputs += 1;
                apply_input(&mut engine, input).map_err(|e| divergence(sequence, format!("engine refused input: {e}")))?
            }
        };

        trades.extend(outcome.trades().cloned());
        pending.extend(outcome.events);
    }

    let last_sequence = records.last().map_or(0, |r| r.sequence);
    if let Some(missing) = pending.front() {
        return Err(divergence(last_sequence, format!("log ends before {missing:?}")));
    }

    let digest = book_digest(engine.book());
    info!(
        symbol = %config.symbol,
        records = records.len(),
        inputs,
        trades = trades.len(),
        digest = %hex::encode(digest),
        "replay complete"
    );
    Ok(ReplayOutcome {
        trade_root: compute_trade_root(&trades),
        book_digest: digest,
        engine,
        trades,
        inputs,
        last_sequence,
    })
}

/// Feed one input record to `engine`. The live symbol actor and replay
/// both go through here, so they cannot drift apart.
pub fn apply_input(engine: &mut MatchingEngine, input: &AuditEvent) -> Result<Outcome> {
    match input {
        AuditEvent::Accepted { order, at } => engine.submit(order.clone(), *at),
        AuditEvent::OcoAccepted { first, second, at } => engine.submit_oco(first.clone(), second.clone(), *at),
        AuditEvent::CancelRequested { target, at } => engine.cancel(target.clone(), *at),
        AuditEvent::ReferencePrice { price, at } => engine.update_reference_price(*price, *at),
        AuditEvent::ResumeRequested { at } => engine.resume_trading(*at),
        AuditEvent::Rejected { .. } | AuditEvent::Engine(_) => Err(TapelineError::Internal(format!(
            "{} is not an engine input",
            input.kind()
        ))),
    }
}

fn divergence(sequence: u64, reason: String) -> TapelineError {
    TapelineError::ReplayDivergence { sequence, reason }
}
