//! Remote data functions for one entity collection.

use async_trait::async_trait;
use chorus_core::{ChorusResult, Entity, EntityKey};

/// Backend operations on the collection of `T`.
///
/// Each call may fail with an arbitrary [`ChorusError`](chorus_core::ChorusError);
/// the executor rolls back local state when it does.
#[async_trait]
pub trait RemoteCollection<T: Entity>: Send + Sync {
    async fn fetch_all(&self) -> ChorusResult<Vec<T>>;

    async fn create(&self, draft: &T::Draft) -> ChorusResult<T>;

    async fn update(&self, key: &EntityKey, patch: &T::Patch) -> ChorusResult<T>;

    async fn delete(&self, key: &EntityKey) -> ChorusResult<()>;
}
