//! The client facade: configuration, one-shot operations, and entry
//! points for batches, transactions, lookups and queries.

use std::collections::HashSet;
use std::sync::Arc;

use alder_types::CommitMode;
use alder_types::CommitResult;
use alder_types::Cursor;
use alder_types::Entity;
use alder_types::Key;
use alder_types::Mutation;
use alder_types::PartialEntity;
use alder_types::PartialKey;
use alder_types::Query;
use alder_types::ReadOptions;
use alder_types::RpcError;
use alder_types::validate_mutation;
use tracing::debug;

use crate::batch::Batch;
use crate::error::ClientError;
use crate::lookup::LookupResults;
use crate::query::QueryResults;
use crate::retry::RetryParams;
use crate::retry::RetryVerdict;
use crate::retry::run_with_retries;
use crate::rpc::EntityStoreRpc;
use crate::transaction::Transaction;

/// Immutable client configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Commit with `force`: the server skips insert/update existence
    /// preconditions.
    pub force: bool,
    /// Retry policy for every remote call issued by this client.
    pub retry: RetryParams,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_retry(mut self, retry: RetryParams) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-batch overrides; unset fields fall back to [`StoreOptions`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub force: Option<bool>,
    pub retry: Option<RetryParams>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    pub fn with_retry(mut self, retry: RetryParams) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Client for a remote transactional entity store.
///
/// Cheap to clone; all clones share the underlying RPC handle. One-shot
/// operations commit immediately; [`batch`](Self::batch) and
/// [`transaction`](Self::transaction) stage mutations for a single
/// combined commit.
#[derive(Clone)]
pub struct StoreClient {
    rpc: Arc<dyn EntityStoreRpc>,
    options: StoreOptions,
}

impl StoreClient {
    pub fn new(rpc: Arc<dyn EntityStoreRpc>) -> Self {
        Self::with_options(rpc, StoreOptions::default())
    }

    pub fn with_options(rpc: Arc<dyn EntityStoreRpc>, options: StoreOptions) -> Self {
        Self { rpc, options }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Start an empty non-transactional batch.
    pub fn batch(&self) -> Batch {
        self.batch_with_options(BatchOptions::default())
    }

    /// Start a batch with per-batch overrides.
    pub fn batch_with_options(&self, options: BatchOptions) -> Batch {
        Batch::new(
            self.rpc.clone(),
            options.retry.unwrap_or_else(|| self.options.retry.clone()),
            options.force.unwrap_or(self.options.force),
        )
    }

    /// Open a transaction on the server.
    pub async fn transaction(&self) -> Result<Transaction, ClientError> {
        self.transaction_with_retry(self.options.retry.clone()).await
    }

    /// Open a transaction with a per-transaction retry policy for its
    /// begin call.
    pub async fn transaction_with_retry(&self, retry: RetryParams) -> Result<Transaction, ClientError> {
        Transaction::begin(self.rpc.clone(), retry).await
    }

    /// Fetch one entity, or `None` if it does not exist.
    pub async fn get(&self, key: Key) -> Result<Option<Entity>, ClientError> {
        self.get_many(vec![key])?.next().await
    }

    /// Fetch several entities lazily; see [`LookupResults`].
    pub fn get_many(&self, keys: Vec<Key>) -> Result<LookupResults, ClientError> {
        self.get_many_with_options(keys, ReadOptions::new())
    }

    /// `get_many` with explicit read options (eventual consistency).
    pub fn get_many_with_options(
        &self,
        keys: Vec<Key>,
        options: ReadOptions,
    ) -> Result<LookupResults, ClientError> {
        LookupResults::new(self.rpc.clone(), self.options.retry.clone(), options, keys)
    }

    /// Run a query from its first page.
    pub fn run(&self, query: Query) -> QueryResults {
        QueryResults::new(self.rpc.clone(), self.options.retry.clone(), query, ReadOptions::new())
    }

    /// Resume a query from a cursor observed on an earlier
    /// [`QueryResults`], possibly in another process.
    pub fn run_from(&self, query: Query, cursor: Cursor) -> QueryResults {
        QueryResults::resume(
            self.rpc.clone(),
            self.options.retry.clone(),
            query,
            ReadOptions::new(),
            cursor,
        )
    }

    /// Reserve one id; the returned key is complete and will never be
    /// auto-assigned to anyone else.
    pub async fn allocate_id(&self, key: impl Into<PartialKey>) -> Result<Key, ClientError> {
        let mut keys = self.allocate_ids(vec![key.into()]).await?;
        match keys.pop() {
            Some(key) if keys.is_empty() => Ok(key),
            _ => Err(ClientError::Service {
                source: RpcError::internal("allocate_ids returned a wrong number of keys"),
            }),
        }
    }

    /// Reserve ids for several partial keys, returned in request order.
    /// Complete keys may be passed; their final id is trimmed first.
    pub async fn allocate_ids(
        &self,
        keys: impl IntoIterator<Item = impl Into<PartialKey>>,
    ) -> Result<Vec<Key>, ClientError> {
        let keys: Vec<PartialKey> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rpc = self.rpc.clone();
        let allocated = run_with_retries(&self.options.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let keys = keys.clone();
            async move { rpc.allocate_ids(keys).await }
        })
        .await?;
        if allocated.len() != keys.len() {
            return Err(ClientError::Service {
                source: RpcError::internal("allocate_ids returned a wrong number of keys"),
            });
        }
        Ok(allocated)
    }

    /// Insert entities in one commit; fails if any key already exists.
    /// Duplicate keys within the call are rejected client-side.
    pub async fn insert(&self, entities: Vec<Entity>) -> Result<(), ClientError> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.key()) {
                return Err(ClientError::invalid_request(format!(
                    "duplicate entity with the key {:?} in one call",
                    entity.key()
                )));
            }
        }
        let mutation = Mutation {
            insert: entities,
            force: self.options.force,
            ..Mutation::default()
        };
        self.commit_one_shot(mutation).await.map(drop)
    }

    /// Insert entities under server-assigned keys, returning them
    /// completed, in submission order.
    pub async fn insert_auto_id(&self, entities: Vec<PartialEntity>) -> Result<Vec<Entity>, ClientError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let count = entities.len();
        let mutation = Mutation {
            insert_auto_id: entities.clone(),
            force: self.options.force,
            ..Mutation::default()
        };
        let result = self.commit_one_shot(mutation).await?;
        if result.auto_id_keys.len() != count {
            return Err(ClientError::Service {
                source: RpcError::internal("commit returned a wrong number of auto-assigned keys"),
            });
        }
        Ok(entities
            .into_iter()
            .zip(result.auto_id_keys)
            .map(|(partial, key)| partial.into_entity(key))
            .collect())
    }

    /// Update entities in one commit; fails if any key does not exist.
    /// Duplicates within the call collapse last-wins.
    pub async fn update(&self, entities: Vec<Entity>) -> Result<(), ClientError> {
        let entities = dedup_last_wins(entities);
        if entities.is_empty() {
            return Ok(());
        }
        let mutation = Mutation {
            update: entities,
            force: self.options.force,
            ..Mutation::default()
        };
        self.commit_one_shot(mutation).await.map(drop)
    }

    /// Write entities unconditionally in one commit. Duplicates within
    /// the call collapse last-wins.
    pub async fn put(&self, entities: Vec<Entity>) -> Result<(), ClientError> {
        let entities = dedup_last_wins(entities);
        if entities.is_empty() {
            return Ok(());
        }
        let mutation = Mutation {
            upsert: entities,
            force: self.options.force,
            ..Mutation::default()
        };
        self.commit_one_shot(mutation).await.map(drop)
    }

    /// Delete keys in one commit. Deleting an absent key is not an
    /// error; duplicate keys collapse.
    pub async fn delete(&self, keys: Vec<Key>) -> Result<(), ClientError> {
        let mut seen = HashSet::new();
        let keys: Vec<Key> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
        if keys.is_empty() {
            return Ok(());
        }
        let mutation = Mutation {
            delete: keys,
            force: self.options.force,
            ..Mutation::default()
        };
        self.commit_one_shot(mutation).await.map(drop)
    }

    async fn commit_one_shot(&self, mutation: Mutation) -> Result<CommitResult, ClientError> {
        validate_mutation(&mutation).map_err(|e| ClientError::invalid_request(e.to_string()))?;
        let rpc = self.rpc.clone();
        let result = run_with_retries(&self.options.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let mutation = mutation.clone();
            async move { rpc.commit(mutation, CommitMode::NonTransactional).await }
        })
        .await?;
        debug!(mutations = mutation.len(), applied = result.mutations_applied, "one-shot commit");
        Ok(result)
    }
}

/// Keep each key's first position but its last value.
fn dedup_last_wins(entities: Vec<Entity>) -> Vec<Entity> {
    let mut deduped: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        match deduped.iter_mut().find(|e| e.key() == entity.key()) {
            Some(slot) => *slot = entity,
            None => deduped.push(entity),
        }
    }
    deduped
}
