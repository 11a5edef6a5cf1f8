// View state with stale-completion guard
// A screen owns a ViewState. Each refresh takes a ticket before it starts;
// when it completes, its result is applied only if no newer refresh started
// and the screen is still open.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::model::CollectionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket(u64);

#[derive(Default)]
pub struct ViewState {
    generation: AtomicU64,
    closed: AtomicBool,
    current: Mutex<Option<CollectionView>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh. Supersedes every earlier ticket.
    pub fn begin(&self) -> ViewTicket {
        ViewTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a result for `ticket` may still be applied.
    pub fn is_current(&self, ticket: ViewTicket) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Store `view` if `ticket` is still current. Returns whether it was applied.
    pub fn apply(&self, ticket: ViewTicket, view: CollectionView) -> bool {
        let mut current = match self.current.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Checked under the lock so a concurrent apply can't interleave
        if !self.is_current(ticket) {
            log::debug!("Dropping stale collection view (ticket {})", ticket.0);
            return false;
        }

        *current = Some(view);
        true
    }

    /// The owner went away; later completions are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<CollectionView> {
        match self.current.lock() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::merge_view;
    use crate::model::PlantRecord;

    fn view_of(name: &str) -> CollectionView {
        merge_view(&[PlantRecord::new(name)], &[])
    }

    #[test]
    fn test_latest_ticket_applies() {
        let state = ViewState::new();
        let ticket = state.begin();
        assert!(state.apply(ticket, view_of("Rosa canina")));
        assert_eq!(state.current().unwrap().len(), 1);
    }

    #[test]
    fn test_superseded_ticket_is_dropped() {
        let state = ViewState::new();
        let old = state.begin();
        let new = state.begin();

        assert!(state.apply(new, view_of("Ficus carica")));
        assert!(!state.apply(old, view_of("Rosa canina")));
        assert_eq!(
            state.current().unwrap().records()[0].identity.scientific_name,
            "Ficus carica"
        );
    }

    #[test]
    fn test_closed_state_ignores_completions() {
        let state = ViewState::new();
        let ticket = state.begin();
        state.close();

        assert!(state.is_closed());
        assert!(!state.apply(ticket, view_of("Rosa canina")));
        assert!(state.current().is_none());
    }
}
