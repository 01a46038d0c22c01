//! Durable homes for audit records.
//!
//! The writer task persists each intent's records as one batch before it
//! acknowledges the caller. A batch that failed is retried whole with the
//! next one, so stores skip records they already hold. `load` always
//! re-verifies the chain, so a tampered or truncated-in-the-middle file
//! never reaches replay.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tapeline_types::{Result, TapelineError};
use tracing::{debug, warn};

use crate::record::{AuditRecord, verify_records};

pub trait AuditStore: Send {
    /// Persist a batch of records, in order. Durable on return.
    ///
    /// Records at or below the highest stored sequence are skipped, so a
    /// batch that failed part-way can be handed over again.
    fn persist(&mut self, records: &[AuditRecord]) -> Result<()>;

    /// Every stored record, chain-verified.
    fn load(&self) -> Result<Vec<AuditRecord>>;
}

/// The tail of `records` past sequence `stored`. The tail must continue
/// the stored chain without a gap.
fn unstored(records: &[AuditRecord], stored: u64) -> Result<&[AuditRecord]> {
    let fresh = &records[records.partition_point(|r| r.sequence <= stored)..];
    match fresh.first() {
        Some(first) if first.sequence != stored + 1 => Err(TapelineError::SequenceGap {
            expected: stored + 1,
            actual: first.sequence,
        }),
        _ => Ok(fresh),
    }
}

/// Keeps records in memory only. Used by tests and ephemeral exchanges.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<AuditRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryStore {
    fn persist(&mut self, records: &[AuditRecord]) -> Result<()> {
        let stored = self.records.last().map_or(0, |r| r.sequence);
        let fresh = unstored(records, stored)?;
        self.records.extend_from_slice(fresh);
        Ok(())
    }

    fn load(&self) -> Result<Vec<AuditRecord>> {
        verify_records(&self.records)?;
        Ok(self.records.clone())
    }
}

/// One JSON record per line, appended and synced per batch.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: File,
    /// Length of the file up to the last synced batch.
    durable_len: u64,
    /// Sequence of the last record in those bytes.
    durable_sequence: u64,
    /// A batch failed after writing began; bytes past `durable_len` may
    /// hold a partial batch.
    dirty: bool,
}

impl JsonLinesStore {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let durable_len = file.metadata()?.len();
        let durable_sequence = last_sequence(&path)?;
        Ok(Self {
            path,
            file,
            durable_len,
            durable_sequence,
            dirty: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and verify a JSON-lines audit file without opening it for
    /// writing.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
        let file = File::open(path.as_ref())?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_line(&line, index + 1)?);
        }
        verify_records(&records)?;
        Ok(records)
    }
}

fn parse_line(line: &str, number: usize) -> Result<AuditRecord> {
    serde_json::from_str(line).map_err(|e| TapelineError::Serialization(format!("line {number}: {e}")))
}

/// Sequence of the last record in the file, zero when it holds none.
fn last_sequence(path: &Path) -> Result<u64> {
    let text = std::fs::read_to_string(path)?;
    let Some((index, line)) = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()).last() else {
        return Ok(0);
    };
    Ok(parse_line(line, index + 1)?.sequence)
}

impl AuditStore for JsonLinesStore {
    fn persist(&mut self, records: &[AuditRecord]) -> Result<()> {
        let fresh = unstored(records, self.durable_sequence)?;
        let Some(last) = fresh.last() else {
            return Ok(());
        };

        if self.dirty {
            self.file.set_len(self.durable_len)?;
            warn!(path = %self.path.display(), len = self.durable_len, "discarded partial audit batch");
            self.dirty = false;
        }

        let mut batch = Vec::new();
        for record in fresh {
            serde_json::to_writer(&mut batch, record)?;
            batch.push(b'\n');
        }
        self.dirty = true;
        self.file.write_all(&batch)?;
        self.file.sync_data()?;
        self.dirty = false;
        self.durable_len += batch.len() as u64;
        self.durable_sequence = last.sequence;

        debug!(path = %self.path.display(), count = fresh.len(), head = last.sequence, "audit batch persisted");
        Ok(())
    }

    fn load(&self) -> Result<Vec<AuditRecord>> {
        Self::read(&self.path)
    }
}
