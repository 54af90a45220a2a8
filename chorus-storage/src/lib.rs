//! Chorus Storage - client-side data access
//!
//! Three layers, leaves first:
//! - [`cache`]: a best-effort TTL cache over a persistent key-value medium,
//!   and a stale-while-revalidate fetcher built on it.
//! - [`mutation`]: optimistic create/update/delete against a remote
//!   collection, with rollback on failure.
//! - [`notify`]: the fire-and-forget notification sink mutations report to.

pub mod cache;
pub mod mutation;
pub mod notify;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, Fetched, KvMedium, LmdbMedium, LmdbMediumError,
    MemoryMedium, RefreshHandle, RefreshOutcome, RevalidatingFetcher, TtlCache, WriteOutcome,
};
pub use mutation::{
    AppliedChange, CollectionMirror, MutationIntent, MutationMessages, MutationReport, MutationState,
    OptimisticCollection, OptimisticExecutor, RemoteCollection,
};
pub use notify::{ChannelSink, Notification, NotificationLevel, NotificationSink, TracingSink};
