//! Persisting the signed-in session between runs.

use std::time::Duration;

use chorus_core::Session;
use chorus_storage::TtlCache;

use crate::SESSION_CACHE_KEY;

/// Session saved by a previous run, unless it has expired.
pub fn restore_session(cache: &TtlCache) -> Option<Session> {
    let session: Session = cache.get(SESSION_CACHE_KEY)?;
    if session.is_expired_at(cache.clock().now_millis()) {
        tracing::debug!(user_id = %session.user.id, "dropping expired persisted session");
        cache.clear(SESSION_CACHE_KEY);
        return None;
    }
    Some(session)
}

/// Save `session` until its token expires, or for `fallback_ttl` when the
/// expiry is unknown. Returns whether the session was stored.
pub fn persist_session(cache: &TtlCache, session: &Session, fallback_ttl: Duration) -> bool {
    let ttl = match session.expires_at {
        Some(at) => {
            let remaining = at - cache.clock().now_millis();
            if remaining <= 0 {
                cache.clear(SESSION_CACHE_KEY);
                return false;
            }
            Duration::from_millis(remaining as u64)
        }
        None => fallback_ttl,
    };
    cache.set(SESSION_CACHE_KEY, session, ttl).is_written()
}

pub fn forget_session(cache: &TtlCache) {
    cache.clear(SESSION_CACHE_KEY);
}
