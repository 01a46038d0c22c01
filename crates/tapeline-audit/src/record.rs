//! One link of the audit chain.
//!
//! ```text
//! payload_hash = SHA-256(json(event))
//! hash         = SHA-256(tag ‖ sequence_le ‖ prev_hash ‖ payload_hash)
//! ```
//!
//! The first record of a symbol chains to [`GENESIS_HASH`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tapeline_types::constants::AUDIT_CHAIN_TAG;
use tapeline_types::{AuditEvent, Result, Symbol, TapelineError};

/// `prev_hash` of the first record.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub symbol: Symbol,
    /// Gapless from 1 per symbol.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: AuditEvent,
    #[serde(with = "hex32")]
    pub payload_hash: [u8; 32],
    #[serde(with = "hex32")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex32")]
    pub hash: [u8; 32],
}

impl AuditRecord {
    /// Build the record that follows `prev_hash` at `sequence`.
    pub fn seal(
        symbol: Symbol,
        sequence: u64,
        prev_hash: [u8; 32],
        event: AuditEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self> {
        let payload_hash = payload_hash(&event)?;
        Ok(Self {
            symbol,
            sequence,
            recorded_at,
            event,
            payload_hash,
            prev_hash,
            hash: chain_hash(sequence, &prev_hash, &payload_hash),
        })
    }

    /// Check this record against the position it should occupy.
    pub fn verify(&self, expected_sequence: u64, expected_prev: &[u8; 32]) -> Result<()> {
        if self.sequence != expected_sequence {
            return Err(TapelineError::SequenceGap {
                expected: expected_sequence,
                actual: self.sequence,
            });
        }
        if &self.prev_hash != expected_prev {
            return Err(self.broken("prev_hash does not match predecessor"));
        }
        if payload_hash(&self.event)? != self.payload_hash {
            return Err(self.broken("payload hash mismatch"));
        }
        if chain_hash(self.sequence, &self.prev_hash, &self.payload_hash) != self.hash {
            return Err(self.broken("record hash mismatch"));
        }
        Ok(())
    }

    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    fn broken(&self, reason: &str) -> TapelineError {
        TapelineError::ChainBroken {
            sequence: self.sequence,
            reason: reason.to_string(),
        }
    }
}

/// SHA-256 of the JSON encoding of `event`.
pub fn payload_hash(event: &AuditEvent) -> Result<[u8; 32]> {
    let bytes = serde_json::to_vec(event)?;
    Ok(Sha256::digest(&bytes).into())
}

#[must_use]
pub fn chain_hash(sequence: u64, prev_hash: &[u8; 32], payload_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(AUDIT_CHAIN_TAG);
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash);
    hasher.update(payload_hash);
    hasher.finalize().into()
}

/// Verify a full chain from the genesis record.
pub fn verify_records(records: &[AuditRecord]) -> Result<()> {
    let mut prev = GENESIS_HASH;
    for (i, record) in records.iter().enumerate() {
        record.verify(i as u64 + 1, &prev)?;
        prev = record.hash;
    }
    Ok(())
}

/// Hashes as lowercase hex strings on the wire.
mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&text, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use tapeline_types::*;

    use super::*;

    fn event(price: u64) -> AuditEvent {
        AuditEvent::ReferencePrice {
            price: Price(price),
            at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn chain(n: u64) -> Vec<AuditRecord> {
        let mut prev = GENESIS_HASH;
        (1..=n)
            .map(|seq| {
                let record = AuditRecord::seal(Symbol::new("BTC-USD"), seq, prev, event(seq), Utc::now()).unwrap();
                prev = record.hash;
                record
            })
            .collect()
    }

    #[test]
    fn sealed_chain_verifies() {
        let records = chain(5);
        assert_eq!(records[0].prev_hash, GENESIS_HASH);
        assert_eq!(records[1].prev_hash, records[0].hash);
        verify_records(&records).unwrap();
    }

    #[test]
    fn tampered_payload_detected() {
        let mut records = chain(3);
        records[1].event = event(999);
        match verify_records(&records) {
            Err(TapelineError::ChainBroken { sequence, .. }) => assert_eq!(sequence, 2),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn removed_record_is_a_gap() {
        let mut records = chain(3);
        records.remove(1);
        assert!(matches!(
            verify_records(&records),
            Err(TapelineError::SequenceGap { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn recomputed_hash_still_breaks_successor() {
        let mut records = chain(3);
        records[0].event = event(42);
        records[0].payload_hash = payload_hash(&records[0].event).unwrap();
        records[0].hash = chain_hash(1, &GENESIS_HASH, &records[0].payload_hash);
        match verify_records(&records) {
            Err(TapelineError::ChainBroken { sequence, .. }) => assert_eq!(sequence, 2),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn json_round_trip_keeps_hashes() {
        let record = chain(1).remove(0);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(&record.hash_hex()));
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        back.verify(1, &GENESIS_HASH).unwrap();
    }
}
