//! Deterministic [`EntityStoreRpc`] doubles for tests.
//!
//! [`ScriptedRpc`] replays a fixed reply script and records every call,
//! for asserting exactly which RPCs a client operation issues.
//! [`InMemoryStore`] is a working hash-map store with real commit,
//! lookup, query and transaction semantics, for end-to-end tests that
//! care about state rather than call shapes.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use alder_types::CommitMode;
use alder_types::CommitResult;
use alder_types::Cursor;
use alder_types::Entity;
use alder_types::Key;
use alder_types::LookupResponse;
use alder_types::Mutation;
use alder_types::PartialKey;
use alder_types::Query;
use alder_types::QueryPage;
use alder_types::ReadOptions;
use alder_types::RpcError;
use alder_types::TransactionHandle;
use alder_types::validate_mutation;
use async_trait::async_trait;

use crate::rpc::EntityStoreRpc;

/// One scripted reply, consumed in order.
#[derive(Debug)]
pub enum ScriptedReply {
    Commit(Result<CommitResult, RpcError>),
    Lookup(Result<LookupResponse, RpcError>),
    RunQuery(Result<QueryPage, RpcError>),
    BeginTransaction(Result<TransactionHandle, RpcError>),
    Rollback(Result<(), RpcError>),
    AllocateIds(Result<Vec<Key>, RpcError>),
}

/// One recorded call, with the arguments the client sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedCall {
    Commit { mutation: Mutation, mode: CommitMode },
    Lookup { keys: Vec<Key>, options: ReadOptions },
    RunQuery { query: Query, cursor: Option<Cursor>, options: ReadOptions },
    BeginTransaction,
    Rollback { handle: TransactionHandle },
    AllocateIds { keys: Vec<PartialKey> },
}

/// Replays a fixed script of replies and records every call.
///
/// Running past the end of the script, or hitting a reply of the wrong
/// kind, fails the RPC with an internal error so the mismatch shows up
/// in the test's assertion output.
#[derive(Debug, Default)]
pub struct ScriptedRpc {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedRpc {
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ScriptedCall) -> Option<ScriptedReply> {
        self.calls.lock().unwrap().push(call);
        self.script.lock().unwrap().pop_front()
    }
}

fn script_error(operation: &str, reply: Option<ScriptedReply>) -> RpcError {
    match reply {
        None => RpcError::internal(format!("script exhausted at {operation}")),
        Some(other) => RpcError::internal(format!("script mismatch at {operation}: next reply is {other:?}")),
    }
}

#[async_trait]
impl EntityStoreRpc for ScriptedRpc {
    async fn commit(&self, mutation: Mutation, mode: CommitMode) -> Result<CommitResult, RpcError> {
        match self.record(ScriptedCall::Commit { mutation, mode }) {
            Some(ScriptedReply::Commit(reply)) => reply,
            other => Err(script_error("commit", other)),
        }
    }

    async fn lookup(&self, keys: Vec<Key>, options: ReadOptions) -> Result<LookupResponse, RpcError> {
        match self.record(ScriptedCall::Lookup { keys, options }) {
            Some(ScriptedReply::Lookup(reply)) => reply,
            other => Err(script_error("lookup", other)),
        }
    }

    async fn run_query(
        &self,
        query: Query,
        cursor: Option<Cursor>,
        options: ReadOptions,
    ) -> Result<QueryPage, RpcError> {
        match self.record(ScriptedCall::RunQuery { query, cursor, options }) {
            Some(ScriptedReply::RunQuery(reply)) => reply,
            other => Err(script_error("run_query", other)),
        }
    }

    async fn begin_transaction(&self) -> Result<TransactionHandle, RpcError> {
        match self.record(ScriptedCall::BeginTransaction) {
            Some(ScriptedReply::BeginTransaction(reply)) => reply,
            other => Err(script_error("begin_transaction", other)),
        }
    }

    async fn rollback(&self, handle: TransactionHandle) -> Result<(), RpcError> {
        match self.record(ScriptedCall::Rollback { handle }) {
            Some(ScriptedReply::Rollback(reply)) => reply,
            other => Err(script_error("rollback", other)),
        }
    }

    async fn allocate_ids(&self, keys: Vec<PartialKey>) -> Result<Vec<Key>, RpcError> {
        match self.record(ScriptedCall::AllocateIds { keys }) {
            Some(ScriptedReply::AllocateIds(reply)) => reply,
            other => Err(script_error("allocate_ids", other)),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    entities: BTreeMap<Key, Entity>,
    open_transactions: HashSet<TransactionHandle>,
    next_id: i64,
    next_handle: u64,
}

/// A working in-memory store.
///
/// Keys are ordered structurally, so queries page deterministically.
/// Insert and update enforce their existence preconditions unless the
/// mutation carries `force`; transaction handles are single-use and a
/// commit consumes its handle whatever the outcome. Cursors encode the
/// offset of the next result.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read, for asserting on state after a commit.
    pub fn entity(&self, key: &Key) -> Option<Entity> {
        self.state.lock().unwrap().entities.get(key).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().unwrap().entities.len()
    }

    /// Seed an entity without going through a commit.
    pub fn seed(&self, entity: Entity) {
        let mut state = self.state.lock().unwrap();
        state.entities.insert(entity.key().clone(), entity);
    }
}

fn decode_offset(cursor: &Cursor) -> Result<usize, RpcError> {
    let bytes: [u8; 8] = cursor
        .as_bytes()
        .try_into()
        .map_err(|_| RpcError::invalid_argument("malformed cursor"))?;
    Ok(u64::from_le_bytes(bytes) as usize)
}

fn encode_offset(offset: usize) -> Cursor {
    Cursor::new((offset as u64).to_le_bytes().to_vec())
}

#[async_trait]
impl EntityStoreRpc for InMemoryStore {
    async fn commit(&self, mutation: Mutation, mode: CommitMode) -> Result<CommitResult, RpcError> {
        validate_mutation(&mutation)?;
        let mut state = self.state.lock().unwrap();
        if let CommitMode::Transactional(handle) = &mode {
            if !state.open_transactions.remove(handle) {
                return Err(RpcError::failed_precondition("unknown or finished transaction"));
            }
        }

        // Precondition checks before any write, so a failed commit
        // leaves the store untouched.
        if !mutation.force {
            for entity in &mutation.insert {
                if state.entities.contains_key(entity.key()) {
                    return Err(RpcError::failed_precondition(format!(
                        "entity already exists: {:?}",
                        entity.key()
                    )));
                }
            }
            for entity in &mutation.update {
                if !state.entities.contains_key(entity.key()) {
                    return Err(RpcError::failed_precondition(format!(
                        "no entity to update: {:?}",
                        entity.key()
                    )));
                }
            }
        }

        let mut auto_id_keys = Vec::with_capacity(mutation.insert_auto_id.len());
        let mut applied = 0u64;
        for partial in mutation.insert_auto_id {
            state.next_id += 1;
            let key = partial.key().clone().complete(state.next_id);
            auto_id_keys.push(key.clone());
            state.entities.insert(key.clone(), partial.into_entity(key));
            applied += 1;
        }
        for entity in mutation.insert.into_iter().chain(mutation.update).chain(mutation.upsert) {
            state.entities.insert(entity.key().clone(), entity);
            applied += 1;
        }
        for key in mutation.delete {
            state.entities.remove(&key);
            applied += 1;
        }
        Ok(CommitResult {
            auto_id_keys,
            mutations_applied: applied,
        })
    }

    async fn lookup(&self, keys: Vec<Key>, _options: ReadOptions) -> Result<LookupResponse, RpcError> {
        let state = self.state.lock().unwrap();
        let found = keys.iter().filter_map(|k| state.entities.get(k).cloned()).collect();
        Ok(LookupResponse {
            found,
            deferred: Vec::new(),
        })
    }

    async fn run_query(
        &self,
        query: Query,
        cursor: Option<Cursor>,
        _options: ReadOptions,
    ) -> Result<QueryPage, RpcError> {
        let state = self.state.lock().unwrap();
        let matches: Vec<&Entity> = state
            .entities
            .values()
            .filter(|e| e.key().kind() == query.kind)
            .collect();
        let offset = match &cursor {
            Some(cursor) => decode_offset(cursor)?,
            None => 0,
        };
        let page_size = query.page_size.map(|n| n as usize).unwrap_or(usize::MAX);
        let end = matches.len().min(offset.saturating_add(page_size));
        let entities: Vec<Entity> = matches
            .get(offset..end)
            .unwrap_or(&[])
            .iter()
            .map(|e| (*e).clone())
            .collect();
        let end_cursor = if end < matches.len() { Some(encode_offset(end)) } else { None };
        Ok(QueryPage { entities, end_cursor })
    }

    async fn begin_transaction(&self) -> Result<TransactionHandle, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.next_handle += 1;
        let handle = TransactionHandle::new(state.next_handle.to_le_bytes().to_vec());
        state.open_transactions.insert(handle.clone());
        Ok(handle)
    }

    async fn rollback(&self, handle: TransactionHandle) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.open_transactions.remove(&handle) {
            Ok(())
        } else {
            Err(RpcError::failed_precondition("unknown or finished transaction"))
        }
    }

    async fn allocate_ids(&self, keys: Vec<PartialKey>) -> Result<Vec<Key>, RpcError> {
        let mut state = self.state.lock().unwrap();
        let mut allocated = Vec::with_capacity(keys.len());
        for key in keys {
            state.next_id += 1;
            allocated.push(key.complete(state.next_id));
        }
        Ok(allocated)
    }
}
