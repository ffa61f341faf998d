//! Best-effort remote persistence of annotations.
//!
//! The editor never waits on a backend. Commits and drag completions queue
//! [`PersistenceOp`]s; the shell runs them through [`dispatch`] on a runtime
//! and feeds the [`PersistenceResult`]s back. Failures are logged and reported
//! but never roll back in-memory state.
//!
//! Records are always in image space.

use crate::types::{Area, Point, Route, Spot};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// The collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Labeled points, keyed by id
    Point,
    /// Named spots, keyed by name
    Spot,
    /// Routes, keyed by route name
    Route,
    /// Areas, keyed by area name
    Area,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Point => "point",
            RecordKind::Spot => "spot",
            RecordKind::Route => "route",
            RecordKind::Area => "area",
        };
        f.write_str(name)
    }
}

/// An annotation as sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A labeled point
    Point(Point),
    /// A named spot
    Spot(Spot),
    /// A route with its waypoints
    Route(Route),
    /// An area with its vertices
    Area(Area),
}

impl Record {
    /// Collection of the record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Point(_) => RecordKind::Point,
            Record::Spot(_) => RecordKind::Spot,
            Record::Route(_) => RecordKind::Route,
            Record::Area(_) => RecordKind::Area,
        }
    }

    /// Natural key used for lookups.
    pub fn key(&self) -> &str {
        match self {
            Record::Point(point) => &point.id,
            Record::Spot(spot) => &spot.name,
            Record::Route(route) => &route.route_name,
            Record::Area(area) => &area.area_name,
        }
    }

    /// Handle of a previously persisted copy, when the editor knows it.
    pub fn external_ref(&self) -> Option<&str> {
        match self {
            Record::Route(route) => route.external_ref.as_deref(),
            Record::Area(area) => area.external_ref.as_deref(),
            Record::Point(_) | Record::Spot(_) => None,
        }
    }
}

/// A record together with the backend's handle for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Opaque backend handle
    pub handle: String,
    /// Stored data
    pub record: Record,
}

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// The handle does not refer to a stored record
    #[error("no stored {kind} with handle {handle}")]
    NotFound {
        /// Record collection
        kind: RecordKind,
        /// Handle that was looked up
        handle: String,
    },
    /// The record has no key and cannot be stored
    #[error("{kind} has no key")]
    MissingKey {
        /// Record collection
        kind: RecordKind,
    },
    /// Transport or storage failure
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Asynchronous store of annotations.
///
/// Every call is independent and may fail on its own.
pub trait AnnotationBackend: Send + Sync {
    /// Looks up a record by its natural key.
    fn find_by_key<'a>(
        &'a self,
        kind: RecordKind,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<StoredRecord>, PersistenceError>>;

    /// Stores a new record and returns its handle.
    fn add(&self, record: Record) -> BoxFuture<'_, Result<String, PersistenceError>>;

    /// Overwrites the record stored under `handle`.
    fn update<'a>(
        &'a self,
        handle: &'a str,
        record: Record,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;

    /// Deletes the record stored under `handle`.
    fn delete<'a>(
        &'a self,
        kind: RecordKind,
        handle: &'a str,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

/// A write scheduled by the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceOp {
    /// A newly labeled entity; an existing record with the same key is a conflict
    Create(Record),
    /// A moved or edited entity; stored by handle or key, added when missing
    Update(Record),
    /// A removed entity
    Delete {
        /// Collection of the removed entity
        kind: RecordKind,
        /// Its key
        key: String,
    },
}

impl PersistenceOp {
    /// Collection the operation targets.
    pub fn kind(&self) -> RecordKind {
        match self {
            PersistenceOp::Create(record) | PersistenceOp::Update(record) => record.kind(),
            PersistenceOp::Delete { kind, .. } => *kind,
        }
    }

    /// Key the operation targets.
    pub fn key(&self) -> &str {
        match self {
            PersistenceOp::Create(record) | PersistenceOp::Update(record) => record.key(),
            PersistenceOp::Delete { key, .. } => key,
        }
    }
}

/// The stored record and the one the editor attempted to create.
///
/// A presentation layer can offer update, rename, keep or cancel from this.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateConflict {
    /// Record already stored under the key
    pub existing: StoredRecord,
    /// Record the editor tried to create
    pub attempted: Record,
}

/// What happened to a [`PersistenceOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceResult {
    /// A new record was stored
    Added {
        /// Collection
        kind: RecordKind,
        /// Key
        key: String,
        /// Handle assigned by the backend
        handle: String,
    },
    /// An existing record was overwritten
    Updated {
        /// Collection
        kind: RecordKind,
        /// Key
        key: String,
    },
    /// A record was deleted
    Deleted {
        /// Collection
        kind: RecordKind,
        /// Key
        key: String,
    },
    /// Nothing to do, e.g. deleting a record that was never stored
    Skipped {
        /// Collection
        kind: RecordKind,
        /// Key
        key: String,
    },
    /// Creation hit an existing record with the same key
    Conflict(DuplicateConflict),
    /// The backend failed; the editor keeps its state
    Failed {
        /// Collection
        kind: RecordKind,
        /// Key
        key: String,
        /// Reported error
        error: PersistenceError,
    },
}

/// Runs one operation against a backend.
///
/// Never returns an error: failures become [`PersistenceResult::Failed`] and
/// are logged.
pub async fn dispatch(backend: &dyn AnnotationBackend, op: PersistenceOp) -> PersistenceResult {
    let kind = op.kind();
    let key = op.key().to_string();
    match run(backend, op).await {
        Ok(result) => {
            log::debug!("Persisted {} \"{}\": {:?}", kind, key, result);
            result
        }
        Err(error) => {
            log::warn!("Persisting {} \"{}\" failed: {}", kind, key, error);
            PersistenceResult::Failed { kind, key, error }
        }
    }
}

async fn run(
    backend: &dyn AnnotationBackend,
    op: PersistenceOp,
) -> Result<PersistenceResult, PersistenceError> {
    let kind = op.kind();
    if op.key().trim().is_empty() {
        return match op {
            PersistenceOp::Delete { key, .. } => Ok(PersistenceResult::Skipped { kind, key }),
            _ => Err(PersistenceError::MissingKey { kind }),
        };
    }

    match op {
        PersistenceOp::Create(record) => {
            let key = record.key().to_string();
            if let Some(existing) = backend.find_by_key(kind, &key).await? {
                return Ok(PersistenceResult::Conflict(DuplicateConflict {
                    existing,
                    attempted: record,
                }));
            }
            let handle = backend.add(record).await?;
            Ok(PersistenceResult::Added { kind, key, handle })
        }
        PersistenceOp::Update(record) => {
            let key = record.key().to_string();
            let handle = match record.external_ref() {
                Some(handle) => Some(handle.to_string()),
                None => backend
                    .find_by_key(kind, &key)
                    .await?
                    .map(|stored| stored.handle),
            };
            match handle {
                Some(handle) => {
                    backend.update(&handle, record).await?;
                    Ok(PersistenceResult::Updated { kind, key })
                }
                None => {
                    let handle = backend.add(record).await?;
                    Ok(PersistenceResult::Added { kind, key, handle })
                }
            }
        }
        PersistenceOp::Delete { kind, key } => match backend.find_by_key(kind, &key).await? {
            Some(stored) => {
                backend.delete(kind, &stored.handle).await?;
                Ok(PersistenceResult::Deleted { kind, key })
            }
            None => Ok(PersistenceResult::Skipped { kind, key }),
        },
    }
}

/// In-process backend holding records in a map keyed by generated handles.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Record>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored record of `kind`.
    pub fn records_of(&self, kind: RecordKind) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| {
                records
                    .values()
                    .filter(|record| record.kind() == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Record>) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Backend("record map poisoned".to_string()))?;
        f(&mut records)
    }
}

impl AnnotationBackend for MemoryBackend {
    fn find_by_key<'a>(
        &'a self,
        kind: RecordKind,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<StoredRecord>, PersistenceError>> {
        let result = self.with_records(|records| {
            let found = records
                .iter()
                .filter(|(_, record)| record.kind() == kind && record.key() == key)
                .min_by(|a, b| a.0.cmp(b.0))
                .map(|(handle, record)| StoredRecord {
                    handle: handle.clone(),
                    record: record.clone(),
                });
            Ok(found)
        });
        futures::future::ready(result).boxed()
    }

    fn add(&self, record: Record) -> BoxFuture<'_, Result<String, PersistenceError>> {
        let result = self.with_records(|records| {
            let handle = uuid::Uuid::new_v4().to_string();
            records.insert(handle.clone(), record);
            Ok(handle)
        });
        futures::future::ready(result).boxed()
    }

    fn update<'a>(
        &'a self,
        handle: &'a str,
        record: Record,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        let result = self.with_records(|records| match records.get_mut(handle) {
            Some(stored) => {
                *stored = record;
                Ok(())
            }
            None => Err(PersistenceError::NotFound {
                kind: record.kind(),
                handle: handle.to_string(),
            }),
        });
        futures::future::ready(result).boxed()
    }

    fn delete<'a>(
        &'a self,
        kind: RecordKind,
        handle: &'a str,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        let result = self.with_records(|records| match records.remove(handle) {
            Some(_) => Ok(()),
            None => Err(PersistenceError::NotFound {
                kind,
                handle: handle.to_string(),
            }),
        });
        futures::future::ready(result).boxed()
    }
}
