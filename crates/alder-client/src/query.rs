//! Cursor-driven query sequence.

use std::collections::VecDeque;
use std::sync::Arc;

use alder_types::Cursor;
use alder_types::Entity;
use alder_types::Query;
use alder_types::ReadOptions;
use tracing::debug;

use crate::error::ClientError;
use crate::retry::RetryParams;
use crate::retry::RetryVerdict;
use crate::retry::run_with_retries;
use crate::rpc::EntityStoreRpc;

/// A lazy pull over a paginated query.
///
/// The current page is drained before the next one is fetched, and the
/// next page is fetched only while the server keeps returning an end
/// cursor; a page without one ends the stream. [`cursor`](Self::cursor)
/// exposes the last end cursor so a caller can persist it and resume
/// later with [`QueryResults::resume`].
pub struct QueryResults {
    rpc: Arc<dyn EntityStoreRpc>,
    retry: RetryParams,
    query: Query,
    options: ReadOptions,
    cursor: Option<Cursor>,
    buffer: VecDeque<Entity>,
    /// Set when a page arrives without an end cursor.
    is_exhausted: bool,
    /// Distinguishes "not started" from "finished": the first page is
    /// fetched even when no cursor is held.
    is_started: bool,
}

impl QueryResults {
    pub(crate) fn new(
        rpc: Arc<dyn EntityStoreRpc>,
        retry: RetryParams,
        query: Query,
        options: ReadOptions,
    ) -> Self {
        Self {
            rpc,
            retry,
            query,
            options,
            cursor: None,
            buffer: VecDeque::new(),
            is_exhausted: false,
            is_started: false,
        }
    }

    /// Resume a query from a previously observed cursor: the first page
    /// fetched is the one following that cursor.
    pub(crate) fn resume(
        rpc: Arc<dyn EntityStoreRpc>,
        retry: RetryParams,
        query: Query,
        options: ReadOptions,
        cursor: Cursor,
    ) -> Self {
        let mut results = Self::new(rpc, retry, query, options);
        results.cursor = Some(cursor);
        results
    }

    /// The end cursor of the most recently fetched page (or the resume
    /// cursor before the first fetch). `None` until a page has been
    /// fetched, and after a final page.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// The next result, or `None` once the final page is drained.
    pub async fn next(&mut self) -> Result<Option<Entity>, ClientError> {
        loop {
            if let Some(entity) = self.buffer.pop_front() {
                return Ok(Some(entity));
            }
            if self.is_exhausted || (self.is_started && self.cursor.is_none()) {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the remaining results into a vector.
    pub async fn collect(mut self) -> Result<Vec<Entity>, ClientError> {
        let mut entities = Vec::new();
        while let Some(entity) = self.next().await? {
            entities.push(entity);
        }
        Ok(entities)
    }

    async fn fetch_page(&mut self) -> Result<(), ClientError> {
        let rpc = self.rpc.clone();
        let query = self.query.clone();
        let options = self.options.clone();
        let cursor = self.cursor.clone();
        let page = run_with_retries(&self.retry, |_| RetryVerdict::Unhandled, || {
            let rpc = rpc.clone();
            let query = query.clone();
            let options = options.clone();
            let cursor = cursor.clone();
            async move { rpc.run_query(query, cursor, options).await }
        })
        .await?;
        debug!(
            kind = %self.query.kind,
            entities = page.entities.len(),
            has_cursor = page.end_cursor.is_some(),
            "query page"
        );
        self.is_started = true;
        self.is_exhausted = page.end_cursor.is_none();
        self.cursor = page.end_cursor;
        self.buffer.extend(page.entities);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alder_types::Key;
    use alder_types::QueryPage;
    use alder_types::RpcError;

    use super::*;
    use crate::testing::ScriptedCall;
    use crate::testing::ScriptedReply;
    use crate::testing::ScriptedRpc;

    fn entity(id: i64) -> Entity {
        Entity::new(Key::new("user", id))
    }

    fn cursor(byte: u8) -> Cursor {
        Cursor::new(vec![byte])
    }

    fn page(ids: &[i64], end: Option<Cursor>) -> ScriptedReply {
        ScriptedReply::RunQuery(Ok(QueryPage {
            entities: ids.iter().map(|id| entity(*id)).collect(),
            end_cursor: end,
        }))
    }

    fn results(rpc: Arc<ScriptedRpc>) -> QueryResults {
        QueryResults::new(rpc, RetryParams::no_retries(), Query::new("user"), ReadOptions::new())
    }

    #[tokio::test]
    async fn pages_are_fetched_lazily_and_in_order() {
        let rpc = Arc::new(ScriptedRpc::new(vec![
            page(&[1, 2], Some(cursor(1))),
            page(&[3], Some(cursor(2))),
            page(&[], None),
        ]));
        let mut seq = results(rpc.clone());
        assert!(rpc.calls().is_empty());

        assert_eq!(seq.next().await.unwrap(), Some(entity(1)));
        assert_eq!(rpc.calls().len(), 1);
        assert_eq!(seq.next().await.unwrap(), Some(entity(2)));
        assert_eq!(rpc.calls().len(), 1);
        assert_eq!(seq.next().await.unwrap(), Some(entity(3)));
        assert_eq!(rpc.calls().len(), 2);
        assert_eq!(seq.next().await.unwrap(), None);
        assert_eq!(rpc.calls().len(), 3);
        assert_eq!(seq.next().await.unwrap(), None);
        assert_eq!(rpc.calls().len(), 3);

        match &rpc.calls()[..] {
            [ScriptedCall::RunQuery { cursor: first, .. }, ScriptedCall::RunQuery { cursor: second, .. }, ScriptedCall::RunQuery { cursor: third, .. }] =>
            {
                assert_eq!(*first, None);
                assert_eq!(*second, Some(cursor(1)));
                assert_eq!(*third, Some(cursor(2)));
            }
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }

    #[tokio::test]
    async fn final_page_without_cursor_ends_the_stream() {
        let rpc = Arc::new(ScriptedRpc::new(vec![page(&[1], None)]));
        let seq = results(rpc.clone());
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
        assert_eq!(rpc.calls().len(), 1);
    }

    #[tokio::test]
    async fn cursor_tracks_the_drained_page() {
        let rpc = Arc::new(ScriptedRpc::new(vec![page(&[1], Some(cursor(7))), page(&[2], None)]));
        let mut seq = results(rpc);
        assert_eq!(seq.cursor(), None);
        assert_eq!(seq.next().await.unwrap(), Some(entity(1)));
        assert_eq!(seq.cursor(), Some(&cursor(7)));
        assert_eq!(seq.next().await.unwrap(), Some(entity(2)));
        assert_eq!(seq.cursor(), None);
    }

    #[tokio::test]
    async fn resuming_from_a_cursor_starts_at_the_following_page() {
        let rpc = Arc::new(ScriptedRpc::new(vec![page(&[3], None)]));
        let seq = QueryResults::resume(
            rpc.clone(),
            RetryParams::no_retries(),
            Query::new("user"),
            ReadOptions::new(),
            cursor(7),
        );
        assert_eq!(seq.collect().await.unwrap(), vec![entity(3)]);
        match &rpc.calls()[..] {
            [ScriptedCall::RunQuery { cursor: resumed, .. }] => assert_eq!(*resumed, Some(cursor(7))),
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }

    #[tokio::test]
    async fn empty_page_with_cursor_keeps_fetching() {
        let rpc = Arc::new(ScriptedRpc::new(vec![page(&[], Some(cursor(1))), page(&[1], None)]));
        let seq = results(rpc.clone());
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
        assert_eq!(rpc.calls().len(), 2);
    }

    #[tokio::test]
    async fn transient_page_failure_is_retried() {
        let rpc = Arc::new(ScriptedRpc::new(vec![
            ScriptedReply::RunQuery(Err(RpcError::unavailable("rebalancing"))),
            page(&[1], None),
        ]));
        let retry = RetryParams::new(std::time::Duration::from_millis(1), 2, std::time::Duration::from_millis(2), 3);
        let seq = QueryResults::new(rpc.clone(), retry, Query::new("user"), ReadOptions::new());
        assert_eq!(seq.collect().await.unwrap(), vec![entity(1)]);
        assert_eq!(rpc.calls().len(), 2);
    }
}
