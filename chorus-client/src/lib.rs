//! Chorus Client - hosted backend access
//!
//! [`RestClient`] talks to a PostgREST-style data API and its companion
//! auth service. It implements [`RemoteCollection`](chorus_storage::RemoteCollection)
//! for every entity and [`AuthBackend`](chorus_session::AuthBackend), so the
//! optimistic collections and the session context can run against it
//! directly.
//!
//! Every request carries the project's anonymous key as `apikey`. The
//! bearer token is the signed-in user's access token, or the anonymous key
//! when nobody is signed in.

mod auth;
pub mod cli;
mod error;
pub mod rest;
pub mod session_store;

pub use cli::Cli;
pub use rest::RestClient;
pub use session_store::{forget_session, persist_session, restore_session};

/// Cache key holding the persisted session between runs.
pub const SESSION_CACHE_KEY: &str = "auth:session";
