//! Read operation shapes: consistency options and lookup responses.

use serde::Deserialize;
use serde::Serialize;

use crate::entity::Entity;
use crate::key::Key;
use crate::mutation::TransactionHandle;

/// Consistency level for read operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReadConsistency {
    #[default]
    Strong,
    Eventual,
}

/// Options carried with every lookup or query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadOptions {
    #[serde(default)]
    pub consistency: ReadConsistency,
    /// Reads issued inside a transaction carry its handle so the server
    /// serves them from the transaction's snapshot.
    pub transaction: Option<TransactionHandle>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eventual() -> Self {
        Self {
            consistency: ReadConsistency::Eventual,
            transaction: None,
        }
    }

    pub fn transactional(handle: TransactionHandle) -> Self {
        Self {
            consistency: ReadConsistency::Strong,
            transaction: Some(handle),
        }
    }
}

/// One round of a lookup.
///
/// Keys that are neither found nor deferred do not exist in the store;
/// the response simply omits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LookupResponse {
    /// Entities resolved this round, in server order.
    pub found: Vec<Entity>,
    /// Keys the server could not resolve this round; the client must
    /// re-request them.
    pub deferred: Vec<Key>,
}
