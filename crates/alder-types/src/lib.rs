//! Wire-shaped types shared between the Alder client core and any RPC
//! implementation of the entity store protocol.
//!
//! This crate is pure data: keys, entities, mutation payloads, read and
//! query shapes, and the remote error taxonomy. It performs no I/O and
//! holds no client logic, so server implementations and test doubles can
//! depend on it without pulling in the client.

pub mod entity;
pub mod error;
pub mod key;
pub mod mutation;
pub mod query;
pub mod read;
pub mod validation;

pub use entity::Entity;
pub use entity::PartialEntity;
pub use entity::Value;
pub use error::ErrorCode;
pub use error::RpcError;
pub use key::Key;
pub use key::KeyId;
pub use key::PartialKey;
pub use key::PathElement;
pub use mutation::CommitMode;
pub use mutation::CommitResult;
pub use mutation::Mutation;
pub use mutation::TransactionHandle;
pub use query::Cursor;
pub use query::Query;
pub use query::QueryPage;
pub use read::LookupResponse;
pub use read::ReadConsistency;
pub use read::ReadOptions;
pub use validation::MAX_COMMIT_MUTATIONS;
pub use validation::MAX_LOOKUP_KEYS;
pub use validation::validate_lookup_keys;
pub use validation::validate_mutation;
