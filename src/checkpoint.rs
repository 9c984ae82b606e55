//! Checkpoints: serialized snapshots of a suspended execution.
//!
//! A [`Checkpoint`] captures everything needed to resume: an opaque
//! configuration reference (meaningful to the host, not inspected here),
//! the full context serialization, and a creation timestamp. Storage is
//! behind the [`CheckpointStore`] trait; [`InMemoryCheckpointStore`] is
//! the default used in tests and development. Durable backends implement
//! the same three operations and own their concurrency guarantees.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::FlowError;
use crate::persistence::PersistedContext;

/// Serializable snapshot of a suspended flow execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    /// Host-meaningful identifier of the configuration this snapshot
    /// belongs to (flow name, config hash, file path; the core does not
    /// inspect it).
    pub config_reference: String,
    pub context: PersistedContext,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint with a generated id and the current time.
    pub fn new(config_reference: impl Into<String>, context: PersistedContext) -> Self {
        Checkpoint {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            config_reference: config_reference.into(),
            context,
            created_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Key-addressable checkpoint persistence.
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint; returns its id.
    fn save(&self, checkpoint: Checkpoint) -> Result<String, FlowError>;

    /// Load a checkpoint by id; `None` if unknown.
    fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, FlowError>;

    /// Delete a checkpoint by id. Deleting an unknown id is not an error.
    fn delete(&self, checkpoint_id: &str) -> Result<(), FlowError>;
}

/// In-process map-backed store.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    store: Mutex<FxHashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.store.lock().expect("checkpoint store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, checkpoint: Checkpoint) -> Result<String, FlowError> {
        let id = checkpoint.checkpoint_id.clone();
        self.store
            .lock()
            .expect("checkpoint store poisoned")
            .insert(id.clone(), checkpoint);
        Ok(id)
    }

    fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, FlowError> {
        Ok(self
            .store
            .lock()
            .expect("checkpoint store poisoned")
            .get(checkpoint_id)
            .cloned())
    }

    fn delete(&self, checkpoint_id: &str) -> Result<(), FlowError> {
        self.store
            .lock()
            .expect("checkpoint store poisoned")
            .remove(checkpoint_id);
        Ok(())
    }
}
