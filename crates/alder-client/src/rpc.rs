//! The RPC seam between the client core and any transport.
//!
//! Everything below this trait — wire encoding, channel management,
//! authentication — is someone else's problem. The client core only
//! assumes the operation contracts documented on each method.

use alder_types::CommitMode;
use alder_types::CommitResult;
use alder_types::Cursor;
use alder_types::Key;
use alder_types::LookupResponse;
use alder_types::Mutation;
use alder_types::PartialKey;
use alder_types::Query;
use alder_types::QueryPage;
use alder_types::ReadOptions;
use alder_types::RpcError;
use alder_types::TransactionHandle;
use async_trait::async_trait;

/// Remote operations of the entity store, treated as black boxes.
///
/// Implementations must be safe to share across tasks; the client core
/// holds one behind an `Arc`. Of these operations only `lookup` and
/// `allocate_ids` are idempotent — a retried `commit` may apply twice,
/// which is why non-transactional retry policy belongs to the caller.
#[async_trait]
pub trait EntityStoreRpc: Send + Sync {
    /// Apply one commit's worth of mutations atomically.
    ///
    /// On success, `auto_id_keys` holds server-assigned keys for the
    /// mutation's `insert_auto_id` entities, in submission order.
    async fn commit(&self, mutation: Mutation, mode: CommitMode) -> Result<CommitResult, RpcError>;

    /// Resolve a batch of keys.
    ///
    /// The response partitions the request into found entities and
    /// deferred keys; keys absent from the store are omitted entirely.
    async fn lookup(&self, keys: Vec<Key>, options: ReadOptions) -> Result<LookupResponse, RpcError>;

    /// Fetch one page of query results, starting at `cursor` if given.
    async fn run_query(
        &self,
        query: Query,
        cursor: Option<Cursor>,
        options: ReadOptions,
    ) -> Result<QueryPage, RpcError>;

    /// Start a server-side transaction and return its handle.
    async fn begin_transaction(&self) -> Result<TransactionHandle, RpcError>;

    /// Abort a transaction. Handles are single-use: rolling back an
    /// unknown or finished transaction is an error.
    async fn rollback(&self, transaction: TransactionHandle) -> Result<(), RpcError>;

    /// Reserve identifiers for partial keys, returned in request order.
    /// Idempotent and safe to retry.
    async fn allocate_ids(&self, keys: Vec<PartialKey>) -> Result<Vec<Key>, RpcError>;
}
