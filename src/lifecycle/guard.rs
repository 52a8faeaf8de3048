//! Terminal hand-off guard

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DeckError, Result};

/// Set while the terminal belongs to a wrapped session
///
/// Rendering checks [`TransitionGuard::is_active`] and skips redraws while
/// it is set. Entering twice is a programming error reported as
/// `AttachRace`.
#[derive(Debug, Default)]
pub struct TransitionGuard {
    active: AtomicBool,
}

/// Held for the duration of one hand-off; releases the guard on drop
#[must_use = "the guard is released when the ticket is dropped"]
pub struct TransitionTicket<'a> {
    guard: &'a TransitionGuard,
}

impl TransitionGuard {
    /// Begin a hand-off
    ///
    /// # Errors
    /// Returns `AttachRace` if a hand-off is already in progress
    pub fn enter(&self) -> Result<TransitionTicket<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeckError::AttachRace)?;
        Ok(TransitionTicket { guard: self })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for TransitionTicket<'_> {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}
