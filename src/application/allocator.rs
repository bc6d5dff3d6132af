use crate::domain::ports::{CounterIncrement, CounterStoreRef};
use crate::domain::sequence::SequenceSpec;
use crate::error::{EngineError, Result};
use tracing::{debug, info, warn};

/// Mints unique, monotonically increasing tokens from named counters.
///
/// The only promise is uniqueness and non-reuse: a token handed to a caller
/// that later fails is simply burned.
#[derive(Clone)]
pub struct SequenceAllocator {
    counters: CounterStoreRef,
}

impl SequenceAllocator {
    pub fn new(counters: CounterStoreRef) -> Self {
        Self { counters }
    }

    /// Creates the counter on first use, seeding it from the legacy counter
    /// when one exists. Never overwrites an existing counter.
    ///
    /// Returns whether this call created the counter.
    pub async fn ensure_initialized(&self, spec: &SequenceSpec) -> Result<bool> {
        if self.counters.get(spec.name).await?.is_some() {
            return Ok(false);
        }

        let legacy_seq = match spec.legacy_name {
            Some(legacy) => self.counters.get(legacy).await?,
            None => None,
        };
        let seed = spec.initial_seq(legacy_seq);

        let created = self.counters.create_if_absent(spec.name, seed).await?;
        if created {
            info!(sequence = spec.name, seed, legacy = legacy_seq.is_some(), "sequence initialized");
        }

        if let (Some(legacy), Some(_)) = (spec.legacy_name, legacy_seq)
            && let Err(error) = self.counters.delete(legacy).await
        {
            warn!(sequence = legacy, %error, "failed to remove legacy counter");
        }

        Ok(created)
    }

    /// Advances the counter by one and returns the formatted token.
    ///
    /// Fails with [`EngineError::AllocationError`] once the counter has reached
    /// the ceiling; the counter is left at the ceiling.
    pub async fn allocate_next(&self, spec: &SequenceSpec) -> Result<String> {
        self.ensure_initialized(spec).await?;

        match self.counters.increment_below(spec.name, spec.ceiling).await? {
            CounterIncrement::Advanced(seq) if spec.contains(seq) => {
                let token = spec.format(seq);
                debug!(sequence = spec.name, %token, "token allocated");
                Ok(token)
            }
            CounterIncrement::Advanced(seq) => {
                warn!(sequence = spec.name, seq, "counter below the sequence floor");
                Err(EngineError::AllocationError(
                    "Card number limit exceeded".to_string(),
                ))
            }
            CounterIncrement::AtCeiling(seq) => {
                warn!(sequence = spec.name, seq, "sequence exhausted");
                Err(EngineError::AllocationError(
                    "Card number limit exceeded".to_string(),
                ))
            }
            CounterIncrement::Missing => Err(EngineError::AllocationError(format!(
                "Failed to allocate {}",
                spec.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CounterStore;
    use crate::domain::sequence::CARD_NUMBER_SEQUENCE;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_token_is_floor() {
        let store = Arc::new(InMemoryStore::new());
        let allocator = SequenceAllocator::new(store.clone());

        assert_eq!(allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap(), "0100");
        assert_eq!(allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap(), "0101");
        assert_eq!(store.get("cardNumber").await.unwrap(), Some(101));
    }

    #[tokio::test]
    async fn test_seeds_from_legacy_counter() {
        let store = Arc::new(InMemoryStore::new());
        store.create_if_absent("cardId", 250).await.unwrap();
        let allocator = SequenceAllocator::new(store.clone());

        assert_eq!(allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap(), "0251");
        assert_eq!(store.get("cardId").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_existing_counter_is_not_reseeded() {
        let store = Arc::new(InMemoryStore::new());
        store.create_if_absent("cardNumber", 500).await.unwrap();
        store.create_if_absent("cardId", 2000).await.unwrap();
        let allocator = SequenceAllocator::new(store.clone());

        assert_eq!(allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap(), "0501");
        // Left alone because the new counter already existed.
        assert_eq!(store.get("cardId").await.unwrap(), Some(2000));
    }

    #[tokio::test]
    async fn test_exhausted_sequence_fails_without_advancing() {
        let store = Arc::new(InMemoryStore::new());
        store.create_if_absent("cardNumber", 9998).await.unwrap();
        let allocator = SequenceAllocator::new(store.clone());

        assert_eq!(allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap(), "9999");
        let err = allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await.unwrap_err();
        assert!(matches!(err, EngineError::AllocationError(_)));
        assert_eq!(err.to_string(), "Card number limit exceeded");
        assert_eq!(store.get("cardNumber").await.unwrap(), Some(9999));
    }
}
