//! Consumer side of the capture: decode the records of a batch and run them
//! through the suppression engine.

use bytes::Bytes;
use capture_common::parsing::{DecodeError, EventRecord, RecordReader};
use suppression::{SuppressionEngine, Verdict};

#[derive(Debug, Clone)]
pub enum Outcome {
    Pass(EventRecord),
    Suppressed(EventRecord),
}

impl Outcome {
    pub fn record(&self) -> &EventRecord {
        match self {
            Outcome::Pass(record) | Outcome::Suppressed(record) => record,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Outcome::Suppressed(_))
    }
}

/// Counters of the records seen by a [`Pipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub passed: u64,
    pub suppressed: u64,
    /// Records cut short by the end of the batch.
    pub truncated: u64,
    /// Records of a type this build doesn't know.
    pub unknown_type: u64,
    /// Records with inconsistent lengths.
    pub malformed: u64,
    /// Bytes thrown away after a decode failure.
    pub dropped_bytes: u64,
}

impl DecodeStats {
    pub fn decode_errors(&self) -> u64 {
        self.truncated + self.unknown_type + self.malformed
    }

    fn count_error(&mut self, err: &DecodeError) {
        match err {
            DecodeError::TruncatedHeader { .. } | DecodeError::TruncatedRecord { .. } => {
                self.truncated += 1
            }
            DecodeError::UnknownEventType(_) => self.unknown_type += 1,
            DecodeError::TooManyParams(_)
            | DecodeError::LengthMismatch { .. }
            | DecodeError::ParamOutOfBounds { .. } => self.malformed += 1,
        }
    }
}

pub struct Pipeline {
    engine: SuppressionEngine,
    stats: DecodeStats,
}

impl Pipeline {
    pub fn new(engine: SuppressionEngine) -> Self {
        Self {
            engine,
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn engine(&self) -> &SuppressionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SuppressionEngine {
        &mut self.engine
    }

    /// Decode and filter a batch of concatenated records.
    ///
    /// A record that fails to decode is dropped and decoding resumes at the
    /// next one. Once the record boundary is lost the rest of the batch is
    /// dropped.
    pub fn ingest(&mut self, batch: Bytes) -> Vec<Outcome> {
        let mut reader = RecordReader::new(batch);
        let mut outcomes = Vec::new();
        loop {
            let before = reader.remaining();
            let Some(next) = reader.next() else {
                break;
            };
            let record = match next {
                Ok(record) => record,
                Err(err) => {
                    self.stats.count_error(&err);
                    if reader.is_stopped() {
                        self.stats.dropped_bytes += reader.remaining() as u64;
                        log::warn!(
                            "dropping {} bytes after decode failure: {err}",
                            reader.remaining()
                        );
                        break;
                    }
                    let skipped = before - reader.remaining();
                    self.stats.dropped_bytes += skipped as u64;
                    log::warn!("skipping record of {skipped} bytes: {err}");
                    continue;
                }
            };
            match self.engine.process_event(&record) {
                Verdict::Pass => {
                    self.stats.passed += 1;
                    outcomes.push(Outcome::Pass(record));
                }
                Verdict::Suppress => {
                    self.stats.suppressed += 1;
                    outcomes.push(Outcome::Suppressed(record));
                }
            }
        }
        outcomes
    }
}
