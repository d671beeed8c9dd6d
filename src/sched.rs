use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::types::ItemId;

/// A slot grant handed out by [`Scheduler::admit`]
///
/// Carries the scheduler generation at grant time so a release that
/// arrives after `clear()` can be recognized as stale.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub id: ItemId,
    pub generation: u64,
}

struct DispatchState {
    /// FIFO of item ids awaiting a free concurrency slot
    pending: VecDeque<ItemId>,
    /// Items currently executing a pipeline
    active: usize,
    /// Bumped by `clear()`; releases from older generations are ignored
    generation: u64,
}

/// Pending queue and concurrency counter as one explicitly owned
/// structure
///
/// Both are mutated only under a single lock, so admit/release are
/// atomic with queue mutation and no callback can decrement against a
/// stale read.
pub struct Scheduler {
    max_concurrent: usize,
    state: Mutex<DispatchState>,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            state: Mutex::new(DispatchState {
                pending: VecDeque::new(),
                active: 0,
                generation: 0,
            }),
        }
    }

    /// Append an id to the back of the pending queue
    pub fn push(&self, id: ItemId) {
        self.state.lock().pending.push_back(id);
    }

    /// Pop the head of the pending queue and take a slot, if one is
    /// free and work is waiting
    pub fn admit(&self) -> Option<Admitted> {
        let mut state = self.state.lock();
        if state.active >= self.max_concurrent {
            return None;
        }
        let id = state.pending.pop_front()?;
        state.active += 1;
        Some(Admitted {
            id,
            generation: state.generation,
        })
    }

    /// Release the slot held by a finished pipeline
    ///
    /// Returns `None` when the grant's generation was invalidated by
    /// `clear()`, otherwise `Some(drained)` where `drained` is true
    /// exactly when this release left no active and no pending work.
    pub fn release(&self, generation: u64) -> Option<bool> {
        let mut state = self.state.lock();
        if generation != state.generation {
            return None;
        }
        state.active = state.active.saturating_sub(1);
        Some(state.active == 0 && state.pending.is_empty())
    }

    /// Filter an id out of the pending queue; returns whether it was
    /// present
    pub fn remove_pending(&self, id: &ItemId) -> bool {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|pending| pending != id);
        state.pending.len() != before
    }

    /// Reset queue and counter in one step and invalidate outstanding
    /// slot grants
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.active = 0;
        state.generation += 1;
    }

    /// Number of items currently executing a pipeline
    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    /// Number of items awaiting a slot
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check whether all admitted work finished and nothing is waiting
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.active == 0 && state.pending.is_empty()
    }
}
