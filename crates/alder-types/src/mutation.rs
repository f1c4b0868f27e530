//! Commit payload: the net set of mutations submitted in one write.

use serde::Deserialize;
use serde::Serialize;

use crate::entity::Entity;
use crate::entity::PartialEntity;
use crate::key::Key;

/// Opaque server-issued transaction identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TransactionHandle(Vec<u8>);

impl TransactionHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// How a commit is isolated on the server side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommitMode {
    NonTransactional,
    Transactional(TransactionHandle),
}

/// One commit's worth of mutations, bucketed by intent.
///
/// Buckets are serialized in this fixed order: `insert_auto_id`, `insert`,
/// `update`, `upsert`, `delete`. Within a bucket, submission order is
/// preserved; the server reports auto-id keys back in `insert_auto_id`
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mutation {
    pub insert_auto_id: Vec<PartialEntity>,
    pub insert: Vec<Entity>,
    pub update: Vec<Entity>,
    pub upsert: Vec<Entity>,
    pub delete: Vec<Key>,
    /// Override conflicting server-side writes instead of failing.
    pub force: bool,
}

impl Mutation {
    pub fn is_empty(&self) -> bool {
        self.insert_auto_id.is_empty()
            && self.insert.is_empty()
            && self.update.is_empty()
            && self.upsert.is_empty()
            && self.delete.is_empty()
    }

    /// Total number of mutations across all buckets.
    pub fn len(&self) -> usize {
        self.insert_auto_id.len() + self.insert.len() + self.update.len() + self.upsert.len() + self.delete.len()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitResult {
    /// Server-assigned keys for `insert_auto_id` entities, in the order
    /// those entities were submitted.
    pub auto_id_keys: Vec<Key>,
    /// Number of mutations the server applied.
    pub mutations_applied: u64,
}
