//! Optimistic mutations.
//!
//! A mutation is applied to the local [`OptimisticCollection`] first, then
//! sent to the [`RemoteCollection`]. The backend's answer either confirms
//! the change or rolls it back; either way the user gets exactly one
//! notification.

pub mod collection;
pub mod executor;
pub mod intent;
pub mod remote;

pub use collection::{AppliedChange, OptimisticCollection};
pub use executor::{CollectionMirror, MutationMessages, OptimisticExecutor, DEFAULT_MUTATION_TIMEOUT};
pub use intent::{MutationIntent, MutationReport, MutationState};
pub use remote::RemoteCollection;
