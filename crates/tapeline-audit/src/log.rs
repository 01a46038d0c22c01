//! Append-only, in-memory audit arena for one symbol.
//!
//! Records are stored in a `Vec` indexed by `sequence - 1`; nothing is
//! ever removed or rewritten.

use chrono::{DateTime, Utc};
use tapeline_types::{AuditEvent, Result, Symbol, TapelineError};
use tracing::debug;

use crate::record::{AuditRecord, GENESIS_HASH, verify_records};

#[derive(Debug)]
pub struct AuditLog {
    symbol: Symbol,
    records: Vec<AuditRecord>,
}

impl AuditLog {
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            records: Vec::new(),
        }
    }

    /// Rebuild a log from stored records. The chain is verified first.
    pub fn from_records(symbol: Symbol, records: Vec<AuditRecord>) -> Result<Self> {
        verify_records(&records)?;
        if let Some(foreign) = records.iter().find(|r| r.symbol != symbol) {
            return Err(TapelineError::ChainBroken {
                sequence: foreign.sequence,
                reason: format!("record belongs to {}, not {symbol}", foreign.symbol),
            });
        }
        Ok(Self { symbol, records })
    }

    /// Chain `event` onto the log. Returns its sequence.
    pub fn append(&mut self, event: AuditEvent, now: DateTime<Utc>) -> Result<u64> {
        let sequence = self.records.len() as u64 + 1;
        let kind = event.kind();
        let record = AuditRecord::seal(self.symbol.clone(), sequence, self.head_hash(), event, now)?;
        debug!(symbol = %self.symbol, sequence, kind, hash = %record.hash_hex(), "audit append");
        self.records.push(record);
        Ok(sequence)
    }

    /// Recompute every hash. Reports the first broken sequence.
    pub fn verify_chain(&self) -> Result<()> {
        verify_records(&self.records)
    }

    #[must_use]
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Records with `sequence >= from`.
    #[must_use]
    pub fn records_from(&self, from: u64) -> &[AuditRecord] {
        let start = usize::try_from(from.saturating_sub(1)).unwrap_or(usize::MAX);
        self.records.get(start..).unwrap_or(&[])
    }

    #[must_use]
    pub fn get(&self, sequence: u64) -> Option<&AuditRecord> {
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.records.get(index)
    }

    /// Hash of the newest record, or the genesis hash when empty.
    #[must_use]
    pub fn head_hash(&self) -> [u8; 32] {
        self.records.last().map_or(GENESIS_HASH, |r| r.hash)
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.records.len() as u64
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tapeline_types::*;

    use super::*;

    fn reference(price: u64) -> AuditEvent {
        AuditEvent::ReferencePrice {
            price: Price(price),
            at: Utc::now(),
        }
    }

    #[test]
    fn append_assigns_gapless_sequences() {
        let mut log = AuditLog::new(Symbol::new("BTC-USD"));
        assert_eq!(log.head_hash(), GENESIS_HASH);
        for expected in 1..=4 {
            assert_eq!(log.append(reference(expected), Utc::now()).unwrap(), expected);
        }
        assert_eq!(log.len(), 4);
        assert_eq!(log.last_sequence(), 4);
        assert_eq!(log.get(2).unwrap().sequence, 2);
        assert!(log.get(0).is_none());
        assert!(log.get(5).is_none());
        assert_eq!(log.head_hash(), log.get(4).unwrap().hash);
        assert_eq!(log.records_from(3).len(), 2);
        assert!(log.records_from(9).is_empty());
        log.verify_chain().unwrap();
    }

    #[test]
    fn from_records_rejects_tampering() {
        let mut log = AuditLog::new(Symbol::new("BTC-USD"));
        log.append(reference(1), Utc::now()).unwrap();
        log.append(reference(2), Utc::now()).unwrap();

        let mut records = log.records().to_vec();
        let restored = AuditLog::from_records(Symbol::new("BTC-USD"), records.clone()).unwrap();
        assert_eq!(restored.head_hash(), log.head_hash());

        records[0].event = reference(3);
        assert!(matches!(
            AuditLog::from_records(Symbol::new("BTC-USD"), records),
            Err(TapelineError::ChainBroken { sequence: 1, .. })
        ));
    }

    #[test]
    fn from_records_rejects_foreign_symbol() {
        let mut log = AuditLog::new(Symbol::new("BTC-USD"));
        log.append(reference(1), Utc::now()).unwrap();
        assert!(AuditLog::from_records(Symbol::new("ETH-USD"), log.records().to_vec()).is_err());
    }
}
