//! Mutation batching: pending write intents and the batch lifecycle.
//!
//! A [`MutationSet`] accumulates per-key write intents and resolves
//! conflicts as they arrive, so one commit expresses the caller's *net*
//! intent: every key ends up with exactly one fate. A [`Batch`] wraps a
//! mutation set with the open → submitted lifecycle and submits it in a
//! single non-transactional commit.

use std::collections::HashSet;
use std::sync::Arc;

use alder_types::CommitMode;
use alder_types::CommitResult;
use alder_types::Entity;
use alder_types::Key;
use alder_types::Mutation;
use alder_types::PartialEntity;
use alder_types::validate_mutation;
use tracing::debug;

use crate::error::ClientError;
use crate::retry::RetryParams;
use crate::retry::RetryVerdict;
use crate::retry::run_with_retries;
use crate::rpc::EntityStoreRpc;

/// Which bucket a key currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Insert,
    Update,
    Upsert,
    Delete,
}

/// Pending write intents for one batch or transaction.
///
/// Keyed buckets preserve insertion order; a complete key occupies at
/// most one bucket at any time. Auto-id entities have no key yet, so
/// they are kept positionally and never deduplicated.
#[derive(Debug, Clone, Default)]
pub struct MutationSet {
    to_insert: Vec<(Key, Entity)>,
    to_insert_auto_id: Vec<PartialEntity>,
    to_update: Vec<(Key, Entity)>,
    to_upsert: Vec<(Key, Entity)>,
    to_delete: Vec<Key>,
}

fn take_entry(bucket: &mut Vec<(Key, Entity)>, key: &Key) -> Option<Entity> {
    let index = bucket.iter().position(|(k, _)| k == key)?;
    Some(bucket.remove(index).1)
}

fn put_entry(bucket: &mut Vec<(Key, Entity)>, key: Key, entity: Entity) {
    match bucket.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = entity,
        None => bucket.push((key, entity)),
    }
}

fn contains_key(bucket: &[(Key, Entity)], key: &Key) -> bool {
    bucket.iter().any(|(k, _)| k == key)
}

/// Reject duplicate keys within one call before touching any bucket.
fn check_intra_call_duplicates(entities: &[Entity]) -> Result<(), ClientError> {
    let mut seen = HashSet::new();
    for entity in entities {
        if !seen.insert(entity.key()) {
            return Err(ClientError::invalid_request(format!(
                "duplicate entity with the key {:?} in one call",
                entity.key()
            )));
        }
    }
    Ok(())
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage insertions.
    ///
    /// A key already staged for insert, update, or upsert is a conflict.
    /// An add that undoes a pending delete becomes an upsert: the net
    /// intent is "write it regardless of prior state".
    pub fn add(&mut self, entities: Vec<Entity>) -> Result<(), ClientError> {
        check_intra_call_duplicates(&entities)?;
        for entity in &entities {
            let key = entity.key();
            if contains_key(&self.to_insert, key)
                || contains_key(&self.to_update, key)
                || contains_key(&self.to_upsert, key)
            {
                return Err(ClientError::invalid_request(format!(
                    "entity with the key {:?} was already added or updated in this batch",
                    key
                )));
            }
        }
        for entity in entities {
            let key = entity.key().clone();
            if let Some(index) = self.to_delete.iter().position(|k| *k == key) {
                self.to_delete.remove(index);
                put_entry(&mut self.to_upsert, key, entity);
            } else {
                self.to_insert.push((key, entity));
            }
        }
        Ok(())
    }

    /// Stage insertions whose keys the server will assign at commit time.
    pub fn add_auto_id(&mut self, entities: Vec<PartialEntity>) {
        self.to_insert_auto_id.extend(entities);
    }

    /// Stage updates.
    ///
    /// Updating a key staged for delete is a conflict. An update after a
    /// staged insert collapses both into an upsert, since the pre-insert
    /// state is unknown client-side and upsert is the superset intent.
    pub fn update(&mut self, entities: Vec<Entity>) -> Result<(), ClientError> {
        check_intra_call_duplicates(&entities)?;
        for entity in &entities {
            if self.to_delete.contains(entity.key()) {
                return Err(ClientError::invalid_request(format!(
                    "entity with the key {:?} was already deleted in this batch",
                    entity.key()
                )));
            }
        }
        for entity in entities {
            let key = entity.key().clone();
            if take_entry(&mut self.to_insert, &key).is_some() || contains_key(&self.to_upsert, &key) {
                put_entry(&mut self.to_upsert, key, entity);
            } else {
                put_entry(&mut self.to_update, key, entity);
            }
        }
        Ok(())
    }

    /// Stage upserts. Put always wins over any prior staged intent.
    pub fn put(&mut self, entities: Vec<Entity>) {
        for entity in entities {
            let key = entity.key().clone();
            take_entry(&mut self.to_insert, &key);
            take_entry(&mut self.to_update, &key);
            self.to_delete.retain(|k| *k != key);
            put_entry(&mut self.to_upsert, key, entity);
        }
    }

    /// Stage deletions. Delete always wins over any prior staged intent.
    pub fn delete(&mut self, keys: Vec<Key>) {
        for key in keys {
            take_entry(&mut self.to_insert, &key);
            take_entry(&mut self.to_update, &key);
            take_entry(&mut self.to_upsert, &key);
            if !self.to_delete.contains(&key) {
                self.to_delete.push(key);
            }
        }
    }

    /// Which bucket `key` currently occupies, if any.
    pub fn bucket(&self, key: &Key) -> Option<Bucket> {
        if contains_key(&self.to_insert, key) {
            Some(Bucket::Insert)
        } else if contains_key(&self.to_update, key) {
            Some(Bucket::Update)
        } else if contains_key(&self.to_upsert, key) {
            Some(Bucket::Upsert)
        } else if self.to_delete.contains(key) {
            Some(Bucket::Delete)
        } else {
            None
        }
    }

    /// The staged entity for `key`, if it is in a keyed bucket.
    pub fn staged(&self, key: &Key) -> Option<&Entity> {
        self.to_insert
            .iter()
            .chain(self.to_update.iter())
            .chain(self.to_upsert.iter())
            .find(|(k, _)| k == key)
            .map(|(_, e)| e)
    }

    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty()
            && self.to_insert_auto_id.is_empty()
            && self.to_update.is_empty()
            && self.to_upsert.is_empty()
            && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_insert.len()
            + self.to_insert_auto_id.len()
            + self.to_update.len()
            + self.to_upsert.len()
            + self.to_delete.len()
    }

    /// Serialize the net intent into one commit payload, buckets in the
    /// fixed order: auto-id inserts, inserts, updates, upserts, deletes.
    pub fn to_mutation(&self, force: bool) -> Mutation {
        Mutation {
            insert_auto_id: self.to_insert_auto_id.clone(),
            insert: self.to_insert.iter().map(|(_, e)| e.clone()).collect(),
            update: self.to_update.iter().map(|(_, e)| e.clone()).collect(),
            upsert: self.to_upsert.iter().map(|(_, e)| e.clone()).collect(),
            delete: self.to_delete.clone(),
            force,
        }
    }
}

/// A non-transactional batch: open until submitted, then terminal.
///
/// Mutating calls and `submit` fail with
/// [`ClientError::InvalidRequest`] once the batch is inactive; a failed
/// submit leaves the batch active so the caller can retry or abandon it.
///
/// Not safe for concurrent use: stateful operations take `&mut self`.
pub struct Batch {
    rpc: Arc<dyn EntityStoreRpc>,
    retry: RetryParams,
    mutations: MutationSet,
    force: bool,
    is_active: bool,
}

impl Batch {
    pub(crate) fn new(rpc: Arc<dyn EntityStoreRpc>, retry: RetryParams, force: bool) -> Self {
        Self {
            rpc,
            retry,
            mutations: MutationSet::new(),
            force,
            is_active: true,
        }
    }

    fn ensure_active(&self) -> Result<(), ClientError> {
        if self.is_active {
            Ok(())
        } else {
            Err(ClientError::invalid_request("batch is no longer active"))
        }
    }

    pub fn add(&mut self, entity: Entity) -> Result<(), ClientError> {
        self.add_many(vec![entity])
    }

    pub fn add_many(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.add(entities.into_iter().collect())
    }

    pub fn add_auto_id(&mut self, entity: PartialEntity) -> Result<(), ClientError> {
        self.add_auto_id_many(vec![entity])
    }

    pub fn add_auto_id_many(&mut self, entities: impl IntoIterator<Item = PartialEntity>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.add_auto_id(entities.into_iter().collect());
        Ok(())
    }

    pub fn update(&mut self, entity: Entity) -> Result<(), ClientError> {
        self.update_many(vec![entity])
    }

    pub fn update_many(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.update(entities.into_iter().collect())
    }

    pub fn put(&mut self, entity: Entity) -> Result<(), ClientError> {
        self.put_many(vec![entity])
    }

    pub fn put_many(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.put(entities.into_iter().collect());
        Ok(())
    }

    pub fn delete(&mut self, key: Key) -> Result<(), ClientError> {
        self.delete_many(vec![key])
    }

    pub fn delete_many(&mut self, keys: impl IntoIterator<Item = Key>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.delete(keys.into_iter().collect());
        Ok(())
    }

    /// True until a submit succeeds.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// The staged mutations.
    pub fn mutations(&self) -> &MutationSet {
        &self.mutations
    }

    /// Commit the staged mutations in one remote write.
    ///
    /// There is no partial success: either the whole batch commits and
    /// the batch becomes inactive, or the error is returned and the
    /// batch stays active. Auto-id keys come back in the order the
    /// auto-id entities were staged.
    pub async fn submit(&mut self) -> Result<CommitResult, ClientError> {
        self.ensure_active()?;
        let mutation = self.mutations.to_mutation(self.force);
        validate_mutation(&mutation).map_err(|e| ClientError::invalid_request(e.to_string()))?;
        let rpc = self.rpc.clone();
        let result = run_with_retries(&self.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let mutation = mutation.clone();
            async move { rpc.commit(mutation, CommitMode::NonTransactional).await }
        })
        .await?;
        self.is_active = false;
        debug!(mutations = mutation.len(), applied = result.mutations_applied, "batch committed");
        Ok(result)
    }
}
