//! Chorus Session - authentication lifecycle
//!
//! [`SessionContext`] owns the signed-in state. It is created explicitly,
//! bootstrapped once at startup and torn down on sign-out; nothing lives in
//! module scope.
//!
//! Bootstrap shows a cached profile right away, then races the
//! authoritative session check and the profile fetch against timeouts.
//! Timeouts degrade the displayed state instead of failing it.

pub mod backend;
pub mod context;
pub mod event;
pub mod state;

pub use backend::AuthBackend;
pub use context::{SessionContext, SessionSettings, PROFILE_LAST_KEY, PROFILE_PREFIX};
pub use event::AuthEvent;
pub use state::{AuthSnapshot, SessionState};
