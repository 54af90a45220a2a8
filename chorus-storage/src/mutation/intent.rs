//! Per-mutation state.

use chorus_core::{ChorusError, ChorusResult, MutationKind};

use super::collection::AppliedChange;

/// Lifecycle of one mutation: `Applied → Confirmed` or `Applied → RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// The tentative change is visible locally; the remote call is pending.
    Applied,
    /// The backend accepted the change.
    Confirmed,
    /// The backend call failed and the local change was undone.
    RolledBack,
    /// Refused before anything was applied (e.g. the target only has a
    /// temporary key).
    Rejected,
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Applied)
    }
}

/// An in-flight local change and what is needed to undo it.
#[derive(Debug, Clone)]
pub struct MutationIntent<T> {
    pub kind: MutationKind,
    /// Collection as it was before the change was applied.
    pub snapshot: Vec<T>,
    /// Entity touched by the change, as it was before the change. For a
    /// create this is the tentative entity.
    pub original: Option<(usize, T)>,
    /// Collection generation right after the change was applied.
    pub generation: u64,
    state: MutationState,
}

impl<T> MutationIntent<T> {
    pub fn applied(
        kind: MutationKind,
        snapshot: Vec<T>,
        original: Option<(usize, T)>,
        generation: u64,
    ) -> Self {
        Self {
            kind,
            snapshot,
            original,
            generation,
            state: MutationState::Applied,
        }
    }

    pub fn from_change(kind: MutationKind, change: AppliedChange<T>) -> Self {
        Self::applied(kind, change.snapshot, change.original, change.generation)
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn confirm(&mut self) {
        debug_assert_eq!(self.state, MutationState::Applied);
        self.state = MutationState::Confirmed;
    }

    pub fn roll_back(&mut self) {
        debug_assert_eq!(self.state, MutationState::Applied);
        self.state = MutationState::RolledBack;
    }
}

/// Outcome of a mutation as seen by the caller: a `{ data, error }` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport<T> {
    pub kind: MutationKind,
    pub state: MutationState,
    pub data: Option<T>,
    pub error: Option<ChorusError>,
}

impl<T> MutationReport<T> {
    pub fn confirmed(kind: MutationKind, data: Option<T>) -> Self {
        Self {
            kind,
            state: MutationState::Confirmed,
            data,
            error: None,
        }
    }

    pub fn failed(kind: MutationKind, state: MutationState, error: ChorusError) -> Self {
        Self {
            kind,
            state,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> ChorusResult<Option<T>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}
