//! Structural validation applied to commit payloads before any I/O.

use crate::error::RpcError;
use crate::key::Key;
use crate::mutation::Mutation;

/// Maximum mutations allowed in a single commit.
pub const MAX_COMMIT_MUTATIONS: u32 = 500;

/// Maximum keys allowed in a single lookup round.
pub const MAX_LOOKUP_KEYS: u32 = 1000;

/// Validate a commit payload against fixed structural limits.
pub fn validate_mutation(mutation: &Mutation) -> Result<(), RpcError> {
    let total = mutation.len();
    if total > MAX_COMMIT_MUTATIONS as usize {
        return Err(RpcError::invalid_argument(format!(
            "commit contains {} mutations, maximum is {}",
            total, MAX_COMMIT_MUTATIONS
        )));
    }
    for entity in &mutation.insert {
        check_key(entity.key())?;
    }
    for entity in &mutation.update {
        check_key(entity.key())?;
    }
    for entity in &mutation.upsert {
        check_key(entity.key())?;
    }
    for key in &mutation.delete {
        check_key(key)?;
    }
    for entity in &mutation.insert_auto_id {
        if entity.key().kind().is_empty() {
            return Err(RpcError::invalid_argument("key segment has an empty kind"));
        }
    }
    Ok(())
}

/// Validate a lookup key list against fixed structural limits.
pub fn validate_lookup_keys(keys: &[Key]) -> Result<(), RpcError> {
    if keys.len() > MAX_LOOKUP_KEYS as usize {
        return Err(RpcError::invalid_argument(format!(
            "lookup requests {} keys, maximum is {}",
            keys.len(),
            MAX_LOOKUP_KEYS
        )));
    }
    for key in keys {
        check_key(key)?;
    }
    Ok(())
}

fn check_key(key: &Key) -> Result<(), RpcError> {
    if key.path().iter().any(|segment| segment.kind.is_empty()) {
        return Err(RpcError::invalid_argument("key segment has an empty kind"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::error::ErrorCode;

    #[test]
    fn empty_mutation_is_valid() {
        assert!(validate_mutation(&Mutation::default()).is_ok());
    }

    #[test]
    fn oversized_commit_rejected() {
        let mutation = Mutation {
            delete: (0..=MAX_COMMIT_MUTATIONS as i64).map(|i| Key::new("user", i)).collect(),
            ..Default::default()
        };
        let err = validate_mutation(&mutation).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn empty_kind_rejected() {
        let mutation = Mutation {
            insert: vec![Entity::new(Key::new("", 1))],
            ..Default::default()
        };
        assert!(validate_mutation(&mutation).is_err());
    }

    #[test]
    fn oversized_lookup_rejected() {
        let keys: Vec<Key> = (0..=MAX_LOOKUP_KEYS as i64).map(|i| Key::new("user", i)).collect();
        assert!(validate_lookup_keys(&keys).is_err());
    }

    #[test]
    fn valid_lookup_accepted() {
        let keys = vec![Key::new("user", 1), Key::new("user", 2)];
        assert!(validate_lookup_keys(&keys).is_ok());
    }
}
