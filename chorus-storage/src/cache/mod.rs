//! Best-effort TTL cache with stale-while-revalidate reads.
//!
//! # Design Philosophy
//!
//! The cache must never block or fail the primary data path. Every failure
//! of the underlying medium (quota exceeded, corrupt entry, I/O error) is
//! logged and reported to the caller as a miss.
//!
//! Reads through [`RevalidatingFetcher`] return cached data immediately and
//! refresh it in a detached task, so consumers may observe data that is stale
//! by at most one refresh cycle.
//!
//! # Write ordering
//!
//! Every write bumps a per-key version. A background refresh only stores its
//! result if the version it observed before fetching is still current, so a
//! write made while the refresh was in flight always wins.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(TtlCache::new(Arc::new(MemoryMedium::new()), clock, "chorus"));
//! let fetcher = RevalidatingFetcher::new(cache, Duration::from_secs(10));
//!
//! let fetched = fetcher
//!     .fetch_with_cache("clients", move || async move { remote.fetch_all().await }, ttl)
//!     .await?;
//! if fetched.read().was_cache_hit() {
//!     // a refresh is running in the background
//! }
//! ```

pub mod entry;
pub mod freshness;
pub mod lmdb_medium;
pub mod medium;
pub mod revalidate;
pub mod ttl_store;

pub use entry::{CacheEntry, CacheStats};
pub use freshness::CacheRead;
pub use lmdb_medium::{LmdbMedium, LmdbMediumError};
pub use medium::{KvMedium, MemoryMedium};
pub use revalidate::{Fetched, RefreshHandle, RefreshOutcome, RevalidatingFetcher};
pub use ttl_store::{TtlCache, WriteOutcome};
