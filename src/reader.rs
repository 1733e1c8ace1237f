//! Bulk reader
//!
//! Executes a read plan one block at a time and fans every block's words
//! back out to its descriptors. A failed block only affects its own
//! descriptors; the rest of the cycle still runs.

use crate::codec::{self, TypedValue};
use crate::error::Unavailable;
use crate::logging::{StructuredLogger, get_logger};
use crate::planner::ReadBlock;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Decoded value of one descriptor in one read cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedValue {
    pub name: String,
    pub value: TypedValue,
    pub timestamp: DateTime<Utc>,
}

/// Per-descriptor outcome of a read cycle
pub type ReadOutcome = Result<DecodedValue, Unavailable>;

/// Outcomes of a read cycle keyed by descriptor name
pub type ReadResults = BTreeMap<String, ReadOutcome>;

/// Issues planned blocks sequentially over one transport
pub struct BulkReader {
    logger: StructuredLogger,
}

impl Default for BulkReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkReader {
    pub fn new() -> Self {
        Self {
            logger: get_logger("reader"),
        }
    }

    pub fn with_logger(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// Run every block in plan order. No retries happen here.
    pub async fn execute<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        blocks: &[ReadBlock<'_>],
    ) -> ReadResults {
        let mut results = ReadResults::new();
        let mut failed_blocks = 0usize;

        for block in blocks {
            self.logger.trace(&format!(
                "Reading {} {} register(s) at {} for {:?}",
                block.length,
                block.kind,
                block.start,
                block.names()
            ));
            let words = match transport.read(block.kind, block.start, block.length).await {
                Ok(words) if words.len() >= usize::from(block.length) => words,
                Ok(words) => {
                    failed_blocks += 1;
                    let reason = format!(
                        "short response at {}: expected {} registers, got {}",
                        block.start,
                        block.length,
                        words.len()
                    );
                    self.logger.warn(&reason);
                    mark_unavailable(&mut results, block, &reason);
                    continue;
                }
                Err(e) => {
                    failed_blocks += 1;
                    let reason = format!("read of {} at {} failed: {}", block.kind, block.start, e);
                    self.logger.warn(&reason);
                    mark_unavailable(&mut results, block, &reason);
                    continue;
                }
            };

            let timestamp = Utc::now();
            for descriptor in &block.descriptors {
                let raw = &words[block.slice_range(descriptor)];
                let outcome = codec::decode(&descriptor.encoding, raw)
                    .map(|value| DecodedValue {
                        name: descriptor.name.clone(),
                        value,
                        timestamp,
                    })
                    .map_err(|e| {
                        self.logger
                            .debug(&format!("Decoding {} failed: {}", descriptor.name, e));
                        Unavailable::new(e.to_string())
                    });
                results.insert(descriptor.name.clone(), outcome);
            }
        }

        self.logger.debug(&format!(
            "Read cycle done: {} block(s), {} failed, {} value(s)",
            blocks.len(),
            failed_blocks,
            results.len()
        ));
        results
    }
}

fn mark_unavailable(results: &mut ReadResults, block: &ReadBlock<'_>, reason: &str) {
    for descriptor in &block.descriptors {
        results.insert(descriptor.name.clone(), Err(Unavailable::new(reason)));
    }
}

/// Serializable view of a read cycle, as printed by the poller
#[derive(Debug, Clone, Serialize)]
pub struct ReadSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, TypedValue>,
    pub unavailable: BTreeMap<String, String>,
}

impl ReadSnapshot {
    pub fn from_results(results: &ReadResults) -> Self {
        let mut values = BTreeMap::new();
        let mut unavailable = BTreeMap::new();
        for (name, outcome) in results {
            match outcome {
                Ok(decoded) => {
                    values.insert(name.clone(), decoded.value.clone());
                }
                Err(e) => {
                    unavailable.insert(name.clone(), e.reason.clone());
                }
            }
        }
        Self {
            timestamp: Utc::now(),
            values,
            unavailable,
        }
    }
}
