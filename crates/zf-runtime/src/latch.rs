//! Single-flight latch for zone evaluations.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LatchState {
    #[default]
    Idle,
    /// Waiting in the work queue; further requests are absorbed.
    Queued,
    Running {
        pending: bool,
    },
}

/// Single-flight latch: idle, queued, or running with an optional follow-up.
///
/// Requests made while the zone waits in the queue are served by that
/// queued run. Requests made while a run is in flight collapse into exactly
/// one follow-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalLatch {
    state: LatchState,
}

impl EvalLatch {
    /// Returns `true` if the caller should enqueue the zone.
    pub fn request(&mut self) -> bool {
        match self.state {
            LatchState::Idle => {
                self.state = LatchState::Queued;
                true
            }
            LatchState::Queued => false,
            LatchState::Running { .. } => {
                self.state = LatchState::Running { pending: true };
                false
            }
        }
    }

    /// The queued run was taken off the queue and starts now.
    pub fn start(&mut self) {
        self.state = LatchState::Running { pending: false };
    }

    /// Mark the current run finished. Returns `true` if a follow-up run is
    /// owed, in which case the zone must be enqueued again.
    pub fn finish(&mut self) -> bool {
        match self.state {
            LatchState::Running { pending: true } => {
                self.state = LatchState::Queued;
                true
            }
            _ => {
                self.state = LatchState::Idle;
                false
            }
        }
    }
}
