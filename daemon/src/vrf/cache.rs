use indexmap::IndexMap;
use log::{debug, warn};
use metrics::counter;
use tokio::sync::RwLock;
use vrand_common::time::{get_current_time_in_seconds, TimestampSeconds};

use crate::config::{BLOCK_HASH_CAPACITY, MIN_REVEAL_DELAY_SECS};

use super::KeyStore;

/// Proof material for one submitted block hash. Written exactly once;
/// never updated, only evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHashRecord {
    pub proof: Vec<u8>,
    pub output: Vec<u8>,
    pub submitted_at: TimestampSeconds,
}

/// Submit/reveal cache for VRF outputs.
///
/// The insertion order of the map doubles as the submission window, so
/// eviction can drop the oldest entries without bookkeeping a second
/// structure. Reveals are gated: an output becomes observable only
/// once the configured delay has elapsed since submission, and before
/// that a query is indistinguishable from one for an unknown hash.
pub struct VrfCache {
    entries: RwLock<IndexMap<String, BlockHashRecord>>,
    capacity: usize,
    min_delay: u64,
}

impl VrfCache {
    pub fn new(capacity: usize, min_delay: u64) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            capacity,
            min_delay,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BLOCK_HASH_CAPACITY, MIN_REVEAL_DELAY_SECS)
    }

    /// Accept a block hash submission.
    ///
    /// Duplicates, malformed hex and a missing VRF key are all
    /// silently dropped, the caller always answers with an empty
    /// body. First submission wins and is never recomputed.
    pub async fn submit(&self, block_hash: &str, keystore: &KeyStore) {
        // fast path, no recomputation for known hashes
        if self.entries.read().await.contains_key(block_hash) {
            return;
        }

        let hash_bytes = match hex::decode(block_hash) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };

        let (proof, output) = match keystore.prove(&hash_bytes).await {
            Ok(Some(proof)) => proof,
            Ok(None) => {
                // fail-open: dropped until a key arrives
                debug!("dropping submission for {}: no vrf key", block_hash);
                return;
            }
            Err(e) => {
                warn!("vrf prove failed for {}: {}", block_hash, e);
                return;
            }
        };

        let mut entries = self.entries.write().await;
        // first write wins against a concurrent submission
        if entries.contains_key(block_hash) {
            return;
        }
        entries.insert(
            block_hash.to_owned(),
            BlockHashRecord {
                proof,
                output,
                submitted_at: get_current_time_in_seconds(),
            },
        );
        counter!("vrand_submissions_total").increment(1);
        self.evict(&mut entries);
    }

    // Trim back to capacity once the window exceeds it by half,
    // dropping oldest first. The hysteresis avoids trimming on every
    // insert once over capacity.
    fn evict(&self, entries: &mut IndexMap<String, BlockHashRecord>) {
        let threshold = self.capacity + self.capacity / 2;
        let len = entries.len();
        if len > threshold {
            let excess = len - self.capacity;
            entries.drain(0..excess);
            counter!("vrand_evictions_total").increment(excess as u64);
            debug!("evicted {} oldest block hash records", excess);
        }
    }

    /// Reveal `(π, β)` for a block hash, or None while unknown or
    /// still delay-gated.
    pub async fn query(&self, block_hash: &str) -> Option<(Vec<u8>, Vec<u8>)> {
        let entries = self.entries.read().await;
        let record = entries.get(block_hash)?;
        if get_current_time_in_seconds() < record.submitted_at + self.min_delay {
            return None;
        }
        counter!("vrand_reveals_total").increment(1);
        Some((record.proof.clone(), record.output.clone()))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, block_hash: &str) -> bool {
        self.entries.read().await.contains_key(block_hash)
    }

    #[cfg(test)]
    pub async fn backdate(&self, block_hash: &str, seconds: u64) {
        let mut entries = self.entries.write().await;
        if let Some(record) = entries.get_mut(block_hash) {
            record.submitted_at = record.submitted_at.saturating_sub(seconds);
        }
    }
}
