use indexmap::IndexMap;
use std::fs;

use crate::config::CacheConfig;
use crate::core::{EngineError, Result, SimulationId, SimulationRecord, SimulationStatus};

/// What `clear` removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Id(SimulationId),
}

/// Bounded store of simulation records, in insertion order.
///
/// Evicted and cleared records take their working directory with them.
#[derive(Debug)]
pub struct ResultCache {
    records: IndexMap<SimulationId, SimulationRecord>,
    max_simulations: usize,
    cleanup_threshold_bytes: Option<u64>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(max_simulations: usize) -> Self {
        Self {
            records: IndexMap::new(),
            max_simulations: max_simulations.max(1),
            cleanup_threshold_bytes: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_simulations).with_cleanup_threshold(config.cleanup_threshold_bytes)
    }

    pub fn with_cleanup_threshold(mut self, bytes: Option<u64>) -> Self {
        self.cleanup_threshold_bytes = bytes;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_simulations
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn total_artifact_bytes(&self) -> u64 {
        self.records.values().map(|r| r.artifact_bytes()).sum()
    }

    /// Store `record` under its id, replacing any previous record with that id.
    ///
    /// Returns the ids evicted to make room.
    pub fn put(&mut self, record: SimulationRecord) -> Vec<SimulationId> {
        let id = record.id.clone();
        let mut evicted = Vec::new();

        if !self.records.contains_key(&id) && self.records.len() >= self.max_simulations {
            match self.eviction_candidate(&id) {
                Some(victim) => {
                    self.remove_and_cleanup(victim.as_str());
                    evicted.push(victim);
                }
                None => tracing::warn!(
                    capacity = self.max_simulations,
                    "cache full of running simulations, growing past its bound"
                ),
            }
        }

        tracing::debug!(simulation = %id, status = %record.status, "caching record");
        self.records.insert(id.clone(), record);

        if let Some(threshold) = self.cleanup_threshold_bytes {
            while self.total_artifact_bytes() > threshold {
                let Some(victim) = self.eviction_candidate(&id) else {
                    tracing::warn!(
                        threshold,
                        total = self.total_artifact_bytes(),
                        "artifact size over threshold with nothing left to evict"
                    );
                    break;
                };
                self.remove_and_cleanup(victim.as_str());
                evicted.push(victim);
            }
        }

        if !evicted.is_empty() {
            tracing::info!(evicted = ?evicted, "evicted cached simulations");
        }
        evicted
    }

    pub fn get(&self, id: &str) -> Result<&SimulationRecord> {
        self.records.get(id).ok_or_else(|| EngineError::not_found(id))
    }

    /// Records in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &SimulationRecord> {
        self.records.values()
    }

    pub fn evict(&mut self, id: &str) -> Result<SimulationRecord> {
        self.remove_and_cleanup(id)
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Remove records and their working directories; returns how many went.
    pub fn clear(&mut self, scope: ClearScope) -> Result<usize> {
        match scope {
            ClearScope::All => {
                let ids: Vec<SimulationId> = self.records.keys().cloned().collect();
                for id in &ids {
                    self.remove_and_cleanup(id.as_str());
                }
                tracing::info!(count = ids.len(), "cache cleared");
                Ok(ids.len())
            }
            ClearScope::Id(id) => self.evict(id.as_str()).map(|_| 1),
        }
    }

    /// Oldest completed record, else oldest failed/timed-out/pending one. Never a running one.
    fn eviction_candidate(&self, protect: &SimulationId) -> Option<SimulationId> {
        let oldest = |wanted: fn(SimulationStatus) -> bool| {
            self.records
                .values()
                .filter(|r| &r.id != protect && wanted(r.status))
                .min_by_key(|r| r.created_at)
                .map(|r| r.id.clone())
        };
        oldest(|s| s == SimulationStatus::Completed).or_else(|| {
            oldest(|s| {
                matches!(
                    s,
                    SimulationStatus::Failed | SimulationStatus::TimedOut | SimulationStatus::Pending
                )
            })
        })
    }

    fn remove_and_cleanup(&mut self, id: &str) -> Option<SimulationRecord> {
        let record = self.records.shift_remove(id)?;
        let dir = &record.working_directory;
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(dir) {
                tracing::warn!(simulation = %id, dir = %dir.display(), error = %e, "could not delete working directory");
            }
        }
        Some(record)
    }
}
