//! Per-run entity cache.
//!
//! Maps entity id → the last merged record observed for it in this run.
//! Entries are created on first reference (from the [`RecordSource`]),
//! replaced after every successful snapshot and dropped with the cache.
//!
//! The source is asked at most once per id: a failed fetch is remembered and
//! reported again for later requests instead of being retried.
//!
//! Callers always receive an owned copy, so mutating it cannot reach the
//! stored entry or any other copy.

use std::collections::HashMap;
use std::time::Duration;

use reconcile_core::{EntityId, Record};

use crate::error::SyncError;
use crate::source::RecordSource;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Served from an earlier request in this run.
    Hit(Record),
    /// Fetched from the source just now.
    Fetched(Record),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_record(self) -> Record {
        match self {
            Lookup::Hit(record) | Lookup::Fetched(record) => record,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub fetches: usize,
}

pub struct EntityCache<S> {
    source: S,
    timeout: Option<Duration>,
    entries: HashMap<EntityId, Record>,
    failed: HashMap<EntityId, String>,
    hits: usize,
    fetches: usize,
}

impl<S: RecordSource> EntityCache<S> {
    /// `timeout` bounds each remote fetch; `None` waits indefinitely.
    pub fn new(source: S, timeout: Option<Duration>) -> Self {
        Self {
            source,
            timeout,
            entries: HashMap::new(),
            failed: HashMap::new(),
            hits: 0,
            fetches: 0,
        }
    }

    /// Return a copy of the cached record, fetching it on first reference.
    pub async fn get_or_fetch(&mut self, entity_id: &EntityId) -> Result<Lookup, SyncError> {
        if let Some(record) = self.entries.get(entity_id) {
            self.hits += 1;
            tracing::debug!("cache hit for {entity_id}");
            return Ok(Lookup::Hit(record.clone()));
        }
        if let Some(message) = self.failed.get(entity_id) {
            return Err(SyncError::FetchPreviouslyFailed {
                entity_id: entity_id.clone(),
                message: message.clone(),
            });
        }

        self.fetches += 1;
        let fetched = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.fetch(entity_id))
                .await
                .unwrap_or_else(|_| {
                    Err(SyncError::FetchTimeout {
                        entity_id: entity_id.clone(),
                        after: limit,
                    })
                }),
            None => self.source.fetch(entity_id).await,
        };

        match fetched {
            Ok(record) => {
                self.entries.insert(entity_id.clone(), record.clone());
                Ok(Lookup::Fetched(record))
            }
            Err(err) => {
                self.failed.insert(entity_id.clone(), err.to_string());
                Err(err)
            }
        }
    }

    /// Replace the stored entry for `entity_id`.
    pub fn update(&mut self, entity_id: EntityId, record: Record) {
        self.entries.insert(entity_id, record);
    }

    /// Borrow the stored entry without copying it.
    pub fn peek(&self, entity_id: &EntityId) -> Option<&Record> {
        self.entries.get(entity_id)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            fetches: self.fetches,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
