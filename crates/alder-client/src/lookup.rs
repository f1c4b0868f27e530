//! Pull-based lookup sequence that resolves deferred keys.
//!
//! The server may answer a lookup with a partial result and defer the
//! rest; [`LookupResults`] keeps re-requesting the deferred keys until a
//! round defers nothing, yielding entities in the order the server
//! resolved them.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use alder_types::Entity;
use alder_types::Key;
use alder_types::ReadOptions;
use alder_types::validate_lookup_keys;
use tracing::debug;

use crate::error::ClientError;
use crate::retry::RetryParams;
use crate::retry::RetryVerdict;
use crate::retry::run_with_retries;
use crate::rpc::EntityStoreRpc;

/// A lazy lookup over a fixed key set.
///
/// No RPC is issued until the first [`next`](Self::next) call. Request
/// keys are de-duplicated preserving first occurrence. Keys that do not
/// exist are silently omitted; an exhausted sequence keeps returning
/// `Ok(None)`.
pub struct LookupResults {
    rpc: Arc<dyn EntityStoreRpc>,
    retry: RetryParams,
    options: ReadOptions,
    /// Keys not yet resolved by any round. Drained all at once per RPC.
    outstanding: Vec<Key>,
    /// Entities from the last round, yielded before the next RPC.
    buffer: VecDeque<Entity>,
}

impl LookupResults {
    pub(crate) fn new(
        rpc: Arc<dyn EntityStoreRpc>,
        retry: RetryParams,
        options: ReadOptions,
        keys: Vec<Key>,
    ) -> Result<Self, ClientError> {
        let mut seen = HashSet::new();
        let outstanding: Vec<Key> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
        validate_lookup_keys(&outstanding).map_err(|e| ClientError::invalid_request(e.to_string()))?;
        Ok(Self {
            rpc,
            retry,
            options,
            outstanding,
            buffer: VecDeque::new(),
        })
    }

    /// The next resolved entity, or `None` once every requested key has
    /// been resolved or found absent.
    pub async fn next(&mut self) -> Result<Option<Entity>, ClientError> {
        loop {
            if let Some(entity) = self.buffer.pop_front() {
                return Ok(Some(entity));
            }
            if self.outstanding.is_empty() {
                return Ok(None);
            }
            self.fetch_round().await?;
        }
    }

    /// Drain the remaining entities into a vector.
    pub async fn collect(mut self) -> Result<Vec<Entity>, ClientError> {
        let mut entities = Vec::new();
        while let Some(entity) = self.next().await? {
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Issue one lookup round for everything outstanding.
    ///
    /// A round may legitimately resolve nothing and defer everything;
    /// progress is still guaranteed because the server eventually
    /// answers, and each round is independently retried on transient
    /// failure (lookups are idempotent).
    async fn fetch_round(&mut self) -> Result<(), ClientError> {
        let rpc = self.rpc.clone();
        let keys = self.outstanding.clone();
        let options = self.options.clone();
        let response = run_with_retries(&self.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let keys = keys.clone();
            let options = options.clone();
            async move { rpc.lookup(keys, options).await }
        })
        .await?;
        debug!(
            requested = self.outstanding.len(),
            found = response.found.len(),
            deferred = response.deferred.len(),
            "lookup round"
        );
        self.buffer.extend(response.found);
        self.outstanding = response.deferred;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alder_types::LookupResponse;
    use alder_types::RpcError;

    use super::*;
    use crate::testing::ScriptedCall;
    use crate::testing::ScriptedReply;
    use crate::testing::ScriptedRpc;

    fn key(id: i64) -> Key {
        Key::new("user", id)
    }

    fn entity(id: i64) -> Entity {
        Entity::new(key(id))
    }

    fn results(rpc: Arc<ScriptedRpc>, keys: Vec<Key>) -> LookupResults {
        LookupResults::new(rpc, RetryParams::no_retries(), ReadOptions::new(), keys).unwrap()
    }

    #[tokio::test]
    async fn empty_input_issues_no_rpc() {
        let rpc = Arc::new(ScriptedRpc::new(vec![]));
        let mut seq = results(rpc.clone(), Vec::new());
        assert_eq!(seq.next().await.unwrap(), None);
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn no_rpc_until_first_next() {
        let rpc = Arc::new(ScriptedRpc::new(vec![ScriptedReply::Lookup(Ok(LookupResponse {
            found: vec![entity(1)],
            deferred: Vec::new(),
        }))]));
        let mut seq = results(rpc.clone(), vec![key(1)]);
        assert!(rpc.calls().is_empty());
        assert_eq!(seq.next().await.unwrap(), Some(entity(1)));
        assert_eq!(rpc.calls().len(), 1);
    }

    #[tokio::test]
    async fn deferred_keys_are_rerequested_until_resolved() {
        let rpc = Arc::new(ScriptedRpc::new(vec![
            ScriptedReply::Lookup(Ok(LookupResponse {
                found: vec![entity(1)],
                deferred: vec![key(2), key(3)],
            })),
            ScriptedReply::Lookup(Ok(LookupResponse {
                found: vec![entity(3), entity(2)],
                deferred: Vec::new(),
            })),
        ]));
        let seq = results(rpc.clone(), vec![key(1), key(2), key(3)]);
        let entities = seq.collect().await.unwrap();
        // Server resolution order, not request order.
        assert_eq!(entities, vec![entity(1), entity(3), entity(2)]);

        match &rpc.calls()[..] {
            [ScriptedCall::Lookup { keys: first, .. }, ScriptedCall::Lookup { keys: second, .. }] => {
                assert_eq!(*first, vec![key(1), key(2), key(3)]);
                assert_eq!(*second, vec![key(2), key(3)]);
            }
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }

    #[tokio::test]
    async fn round_that_defers_everything_still_progresses() {
        let rpc = Arc::new(ScriptedRpc::new(vec![
            ScriptedReply::Lookup(Ok(LookupResponse {
                found: Vec::new(),
                deferred: vec![key(1)],
            })),
            ScriptedReply::Lookup(Ok(LookupResponse {
                found: vec![entity(1)],
                deferred: Vec::new(),
            })),
        ]));
        let seq = results(rpc.clone(), vec![key(1)]);
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
        assert_eq!(rpc.calls().len(), 2);
    }

    #[tokio::test]
    async fn missing_keys_are_omitted_without_error() {
        let rpc = Arc::new(ScriptedRpc::new(vec![ScriptedReply::Lookup(Ok(LookupResponse {
            found: vec![entity(1)],
            deferred: Vec::new(),
        }))]));
        let seq = results(rpc, vec![key(1), key(42)]);
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
    }

    #[tokio::test]
    async fn duplicate_request_keys_collapse_to_first_occurrence() {
        let rpc = Arc::new(ScriptedRpc::new(vec![ScriptedReply::Lookup(Ok(LookupResponse {
            found: vec![entity(1), entity(2)],
            deferred: Vec::new(),
        }))]));
        let seq = results(rpc.clone(), vec![key(1), key(2), key(1)]);
        seq.collect().await.unwrap();
        match &rpc.calls()[..] {
            [ScriptedCall::Lookup { keys, .. }] => assert_eq!(*keys, vec![key(1), key(2)]),
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_sequence_keeps_returning_none() {
        let rpc = Arc::new(ScriptedRpc::new(vec![ScriptedReply::Lookup(Ok(LookupResponse::default()))]));
        let mut seq = results(rpc.clone(), vec![key(1)]);
        assert_eq!(seq.next().await.unwrap(), None);
        assert_eq!(seq.next().await.unwrap(), None);
        assert_eq!(rpc.calls().len(), 1);
    }

    #[tokio::test]
    async fn transient_round_failure_is_retried() {
        let rpc = Arc::new(ScriptedRpc::new(vec![
            ScriptedReply::Lookup(Err(RpcError::unavailable("follower lag"))),
            ScriptedReply::Lookup(Ok(LookupResponse {
                found: vec![entity(1)],
                deferred: Vec::new(),
            })),
        ]));
        let retry = RetryParams::new(std::time::Duration::from_millis(1), 2, std::time::Duration::from_millis(2), 3);
        let seq = LookupResults::new(rpc.clone(), retry, ReadOptions::new(), vec![key(1)]).unwrap();
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
        assert_eq!(rpc.calls().len(), 2);
    }
}
