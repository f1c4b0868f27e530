//! Client core for the Alder entity store.
//!
//! Everything remote goes through the [`EntityStoreRpc`] trait; this
//! crate supplies what sits on top of it client-side:
//!
//! - [`StoreClient`]: the facade, with one-shot commit operations,
//!   retrying lookups and cursor-driven queries.
//! - [`Batch`] and [`Transaction`]: staged mutations over a
//!   [`MutationSet`], committed in one remote write.
//! - [`retry::run_with_retries`]: the shared retry executor with
//!   exponential backoff and pluggable failure classification.
//! - [`testing`]: deterministic RPC doubles for downstream tests.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use alder_client::StoreClient;
//! use alder_client::testing::InMemoryStore;
//! use alder_types::Entity;
//! use alder_types::Key;
//!
//! # async fn example() -> Result<(), alder_client::ClientError> {
//! let client = StoreClient::new(Arc::new(InMemoryStore::new()));
//!
//! let mut batch = client.batch();
//! batch.add(Entity::new(Key::new("user", 1)).property("name", "alice"))?;
//! batch.delete(Key::new("user", 2))?;
//! batch.submit().await?;
//!
//! let user = client.get(Key::new("user", 1)).await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod error;
pub mod lookup;
pub mod query;
pub mod retry;
pub mod rpc;
pub mod testing;
pub mod transaction;

pub use batch::Batch;
pub use batch::Bucket;
pub use batch::MutationSet;
pub use client::BatchOptions;
pub use client::StoreClient;
pub use client::StoreOptions;
pub use error::ClientError;
pub use lookup::LookupResults;
pub use query::QueryResults;
pub use retry::RetryParams;
pub use retry::RetryVerdict;
pub use rpc::EntityStoreRpc;
pub use transaction::Transaction;
