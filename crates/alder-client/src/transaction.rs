//! Client-side transactions: staged mutations plus snapshot reads,
//! committed atomically under a server-issued handle.

use std::sync::Arc;

use alder_types::CommitMode;
use alder_types::CommitResult;
use alder_types::Entity;
use alder_types::Key;
use alder_types::PartialEntity;
use alder_types::Query;
use alder_types::ReadOptions;
use alder_types::TransactionHandle;
use alder_types::validate_mutation;
use tracing::debug;
use tracing::warn;

use crate::batch::MutationSet;
use crate::error::ClientError;
use crate::lookup::LookupResults;
use crate::query::QueryResults;
use crate::retry::RetryParams;
use crate::retry::RetryVerdict;
use crate::retry::run_with_retries;
use crate::rpc::EntityStoreRpc;

/// An open transaction.
///
/// Reads carry the transaction handle so the server serves them from
/// the transaction's snapshot; writes are staged client-side in a
/// [`MutationSet`] and sent in one transactional commit on
/// [`submit`](Self::submit).
///
/// The transaction ends when a submit succeeds or a rollback is
/// issued; a failed submit leaves it active so the caller can retry
/// the submit or roll back. Every operation on a finished transaction
/// fails with [`ClientError::InvalidRequest`] and issues no RPC.
pub struct Transaction {
    rpc: Arc<dyn EntityStoreRpc>,
    retry: RetryParams,
    handle: TransactionHandle,
    mutations: MutationSet,
    is_active: bool,
}

impl Transaction {
    /// Open a transaction on the server. Begin is safe to retry: an
    /// orphaned handle from a lost response simply expires server-side.
    pub(crate) async fn begin(rpc: Arc<dyn EntityStoreRpc>, retry: RetryParams) -> Result<Self, ClientError> {
        let handle = {
            let rpc = rpc.clone();
            run_with_retries(&retry, |_| RetryVerdict::Unhandled, || {
                let rpc = rpc.clone();
                async move { rpc.begin_transaction().await }
            })
            .await?
        };
        debug!(handle = ?handle, "transaction started");
        Ok(Self {
            rpc,
            retry,
            handle,
            mutations: MutationSet::new(),
            is_active: true,
        })
    }

    fn ensure_active(&self) -> Result<(), ClientError> {
        if self.is_active {
            Ok(())
        } else {
            Err(ClientError::invalid_request("transaction is no longer active"))
        }
    }

    /// The server-issued handle, e.g. for correlating server-side logs.
    pub fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn add(&mut self, entity: Entity) -> Result<(), ClientError> {
        self.add_many(vec![entity])
    }

    pub fn add_many(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.add(entities.into_iter().collect())
    }

    pub fn add_auto_id(&mut self, entity: PartialEntity) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.mutations.add_auto_id(vec![entity]);
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

    /// Read one entity from the transaction's snapshot.
    pub async fn get(&mut self, key: Key) -> Result<Option<Entity>, ClientError> {
        let mut results = self.get_many(vec![key])?;
        results.next().await
    }

    /// Read several entities from the transaction's snapshot.
    pub fn get_many(&mut self, keys: Vec<Key>) -> Result<LookupResults, ClientError> {
        self.ensure_active()?;
        LookupResults::new(
            self.rpc.clone(),
            self.retry.clone(),
            ReadOptions::transactional(self.handle.clone()),
            keys,
        )
    }

    /// Run a query against the transaction's snapshot.
    pub fn run(&mut self, query: Query) -> Result<QueryResults, ClientError> {
        self.ensure_active()?;
        Ok(QueryResults::new(
            self.rpc.clone(),
            self.retry.clone(),
            query,
            ReadOptions::transactional(self.handle.clone()),
        ))
    }

    /// Commit the staged mutations atomically.
    ///
    /// The commit runs through the retry executor under the default
    /// policy, so a transient failure (including a retriable
    /// `TransactionAborted`) is retried until attempts run out. On
    /// failure the transaction stays active and the caller decides:
    /// retry the submit, or roll back and start over.
    pub async fn submit(&mut self) -> Result<CommitResult, ClientError> {
        self.ensure_active()?;
        let mutation = self.mutations.to_mutation(false);
        validate_mutation(&mutation).map_err(|e| ClientError::invalid_request(e.to_string()))?;
        let rpc = self.rpc.clone();
        let handle = self.handle.clone();
        let result = run_with_retries(&self.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let mutation = mutation.clone();
            let handle = handle.clone();
            async move { rpc.commit(mutation, CommitMode::Transactional(handle)).await }
        })
        .await?;
        self.is_active = false;
        debug!(handle = ?self.handle, mutations = mutation.len(), "transaction committed");
        Ok(result)
    }

    /// Abandon the transaction, releasing its server-side state.
    pub async fn rollback(&mut self) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.is_active = false;
        match self.rpc.rollback(self.handle.clone()).await {
            Ok(()) => Ok(()),
            Err(source) => {
                // The handle expires server-side regardless.
                warn!(handle = ?self.handle, error = %source, "rollback failed");
                Err(ClientError::Service { source })
            }
        }
    }
}
