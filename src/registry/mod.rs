//! Instance registry with conversation-id uniqueness
//!
//! Holds every tracked [`Instance`] in insertion order. Claiming an external
//! session id and deduplicating happen under the write lock, so two
//! instances can never end up holding the same id.

mod instance;

pub use instance::Instance;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DeckError, Result};
use crate::types::identifiers::{ExternalSessionId, InstanceId, MuxSessionName};
use crate::types::record::InstanceRecord;

/// Ordered set of tracked instances
#[derive(Debug, Default)]
pub struct Registry {
    instances: RwLock<Vec<Arc<Instance>>>,
}

impl Registry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records
    ///
    /// Duplicate conversation ids in the records are resolved right away;
    /// the ids of instances that lost theirs are returned.
    #[must_use]
    pub fn from_records(records: Vec<InstanceRecord>) -> (Self, Vec<InstanceId>) {
        let registry = Self::new();
        let cleared = registry.load(records);
        (registry, cleared)
    }

    /// Replace the contents with persisted records and deduplicate
    pub fn load(&self, records: Vec<InstanceRecord>) -> Vec<InstanceId> {
        let mut instances = self.instances.write();
        *instances = records
            .into_iter()
            .map(|record| Arc::new(Instance::from_record(record)))
            .collect();
        deduplicate_locked(&instances)
    }

    /// Cloned handles to every instance, in registry order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Instance>> {
        self.instances.read().clone()
    }

    /// Ids in registry order
    #[must_use]
    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.read().iter().map(|i| i.id().clone()).collect()
    }

    /// Number of registered instances
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether no instance is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Look up an instance by id
    #[must_use]
    pub fn get(&self, id: &InstanceId) -> Option<Arc<Instance>> {
        self.instances.read().iter().find(|i| i.id() == id).cloned()
    }

    /// Look up an instance by id or fail with `InstanceNotFound`
    ///
    /// # Errors
    /// Returns `InstanceNotFound` if no instance has this id
    pub fn require(&self, id: &InstanceId) -> Result<Arc<Instance>> {
        self.get(id).ok_or_else(|| DeckError::instance_not_found(id))
    }

    /// Instance backed by the given multiplexer session
    #[must_use]
    pub fn find_by_session(&self, name: &MuxSessionName) -> Option<Arc<Instance>> {
        self.instances
            .read()
            .iter()
            .find(|i| i.mux_session().as_ref() == Some(name))
            .cloned()
    }

    /// Add an instance (or replace the one with the same id) and deduplicate
    pub fn insert(&self, instance: Arc<Instance>) -> Vec<InstanceId> {
        let mut instances = self.instances.write();
        match instances.iter().position(|i| i.id() == instance.id()) {
            Some(pos) => instances[pos] = instance,
            None => instances.push(instance),
        }
        deduplicate_locked(&instances)
    }

    /// Remove an instance, returning it if it was present
    pub fn remove(&self, id: &InstanceId) -> Option<Arc<Instance>> {
        let mut instances = self.instances.write();
        let pos = instances.iter().position(|i| i.id() == id)?;
        Some(instances.remove(pos))
    }

    /// Every conversation id currently held
    #[must_use]
    pub fn claimed_external_ids(&self) -> HashSet<ExternalSessionId> {
        self.instances
            .read()
            .iter()
            .filter_map(|i| i.external_session_id())
            .collect()
    }

    /// Give `external` to instance `id` unless another instance holds it
    ///
    /// Returns `Ok(false)` when the id is taken.
    ///
    /// # Errors
    /// Returns `InstanceNotFound` if `id` is not registered
    pub fn claim_external_id(&self, id: &InstanceId, external: ExternalSessionId) -> Result<bool> {
        let instances = self.instances.write();
        let target = instances
            .iter()
            .find(|i| i.id() == id)
            .ok_or_else(|| DeckError::instance_not_found(id))?;

        let taken = instances
            .iter()
            .any(|i| i.id() != id && i.external_session_id().as_ref() == Some(&external));
        if taken {
            log::debug!("Conversation id {external} already held; not assigning to {id}");
            return Ok(false);
        }

        target.set_external_session_id(Some(external));
        Ok(true)
    }

    /// Drop the conversation id of instance `id`
    ///
    /// # Errors
    /// Returns `InstanceNotFound` if `id` is not registered
    pub fn release_external_id(&self, id: &InstanceId) -> Result<()> {
        let instances = self.instances.write();
        let target = instances
            .iter()
            .find(|i| i.id() == id)
            .ok_or_else(|| DeckError::instance_not_found(id))?;
        target.clear_identity_for_redetection();
        Ok(())
    }

    /// Resolve duplicate conversation ids
    ///
    /// The earliest created holder keeps the id (registry order breaks
    /// ties); every later holder loses it and is flagged for detection.
    pub fn deduplicate(&self) -> Vec<InstanceId> {
        let instances = self.instances.write();
        deduplicate_locked(&instances)
    }

    /// Persistable snapshot of every instance
    #[must_use]
    pub fn records(&self) -> Vec<InstanceRecord> {
        self.instances.read().iter().map(|i| i.record()).collect()
    }
}

fn deduplicate_locked(instances: &[Arc<Instance>]) -> Vec<InstanceId> {
    let mut order: Vec<usize> = (0..instances.len()).collect();
    order.sort_by_key(|&pos| (instances[pos].created_at(), pos));

    let mut owners: HashMap<ExternalSessionId, InstanceId> = HashMap::new();
    let mut cleared = Vec::new();
    for pos in order {
        let instance = &instances[pos];
        let Some(external) = instance.external_session_id() else {
            continue;
        };
        if let Some(owner) = owners.get(&external) {
            log::warn!(
                "Instance {} shares conversation id {external} with {owner}; clearing it",
                instance.id()
            );
            instance.clear_identity_for_redetection();
            cleared.push(instance.id().clone());
        } else {
            owners.insert(external, instance.id().clone());
        }
    }
    cleared
}
