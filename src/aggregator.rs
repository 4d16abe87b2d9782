//! Turns complete feed lines into published result snapshots.

use crate::error::PayloadError;
use crate::record::{EnrichedRecord, RawRecord, ResultSet};
use feed_frames::Frame;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with a `data:` frame whose payload does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log it, count it and keep reading.
    #[default]
    Skip,
    /// End the stream with a payload error.
    Abort,
}

/// How `isRecommended` is resolved when a record carries no explicit flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecommendationPolicy {
    /// The first record parsed in the stream is recommended, later ones are not.
    #[default]
    FirstRecord,
    /// Only an explicit `recommended: true` marks a record.
    ExplicitOnly,
}

/// Product-policy knobs of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelinePolicy {
    /// Handling of unparseable payloads.
    pub malformed: MalformedPolicy,
    /// Default recommendation rule.
    pub recommendation: RecommendationPolicy,
}

/// Counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Complete lines seen, blank ones included.
    pub lines: u64,
    /// Non-empty `data:` frames.
    pub data_frames: u64,
    /// Payloads that parsed into a record.
    pub records: u64,
    /// Payloads that failed to parse.
    pub malformed: u64,
    /// Records dropped because their name was already published.
    pub duplicates: u64,
    /// Snapshots handed to the observer.
    pub published: u64,
    /// Bytes of unterminated trailing text dropped at end of stream.
    pub residual_bytes: u64,
}

/// Result of feeding one line to the [`Aggregator`].
#[derive(Debug)]
pub enum LineOutcome {
    /// Blank line, non-data field, or empty payload.
    Ignored,
    /// Payload failed to parse and was skipped.
    Malformed(PayloadError),
    /// Record parsed but its name was already published; it consumed `id`.
    Duplicate {
        /// Identifier the discarded record was assigned.
        id: u64,
    },
    /// Record appended; carries the new snapshot.
    Published(ResultSet),
}

/// Sequential record aggregator for a single stream.
///
/// Identifiers follow parse order and are never reused. The first record to claim a
/// name wins; later records with that name are dropped.
#[derive(Debug)]
pub struct Aggregator {
    query: Arc<str>,
    policy: PipelinePolicy,
    current: Option<ResultSet>,
    stats: StreamStats,
}

impl Aggregator {
    /// Creates an aggregator for `query` with the given policy.
    pub fn new(query: impl Into<Arc<str>>, policy: PipelinePolicy) -> Self {
        Self {
            query: query.into(),
            policy,
            current: None,
            stats: StreamStats::default(),
        }
    }

    /// Latest published snapshot, if any.
    pub fn current(&self) -> Option<&ResultSet> {
        self.current.as_ref()
    }

    /// Counters so far.
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Records the length of the unterminated text dropped at end of stream.
    pub fn note_residual(&mut self, residual: &str) {
        debug!(bytes = residual.len(), "dropping unterminated trailing frame");
        self.stats.residual_bytes += residual.len() as u64;
    }

    /// Consumes the aggregator, returning the final snapshot and counters.
    pub fn finish(self) -> (Option<ResultSet>, StreamStats) {
        (self.current, self.stats)
    }

    /// Processes one complete line.
    ///
    /// Returns an error only when the payload is malformed and the policy is
    /// [`MalformedPolicy::Abort`].
    pub fn ingest_line(&mut self, line: &str) -> Result<LineOutcome, PayloadError> {
        self.stats.lines += 1;
        let payload = match Frame::classify(line).payload() {
            Some(payload) => payload,
            None => return Ok(LineOutcome::Ignored),
        };
        self.stats.data_frames += 1;

        let raw = match RawRecord::from_payload(payload) {
            Ok(raw) => raw,
            Err(source) => {
                self.stats.malformed += 1;
                let err = PayloadError {
                    line: self.stats.lines,
                    source,
                };
                return match self.policy.malformed {
                    MalformedPolicy::Skip => {
                        warn!(line = err.line, error = %err.source, "skipping malformed payload");
                        Ok(LineOutcome::Malformed(err))
                    }
                    MalformedPolicy::Abort => Err(err),
                };
            }
        };

        self.stats.records += 1;
        let id = self.stats.records;
        let is_recommended = raw.recommended.unwrap_or(match self.policy.recommendation {
            RecommendationPolicy::FirstRecord => id == 1,
            RecommendationPolicy::ExplicitOnly => false,
        });

        if let Some(current) = &self.current {
            if current.contains(raw.name.as_deref()) {
                self.stats.duplicates += 1;
                debug!(id, name = ?raw.name, "dropping duplicate record");
                return Ok(LineOutcome::Duplicate { id });
            }
        }

        let record = EnrichedRecord::enrich(raw, id, is_recommended);
        info!(
            id,
            name = record.display_name(),
            score = record.score,
            recommended = record.is_recommended,
            "record published"
        );
        let next = match &self.current {
            Some(current) => current.with_product(record),
            None => ResultSet::first(Arc::clone(&self.query), record),
        };
        self.current = Some(next.clone());
        self.stats.published += 1;
        Ok(LineOutcome::Published(next))
    }
}
