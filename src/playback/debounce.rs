use std::time::{Duration, Instant};

/// Holds the latest value until `delay` passes without a newer one.
///
/// Every `arm` replaces the pending value and restarts the wait, so a burst
/// of updates collapses into its last value and at most one is pending.
#[derive(Debug)]
pub(crate) struct DebounceTimer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> DebounceTimer<T> {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub(crate) fn arm(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.delay, value));
    }

    /// Takes the pending value once its quiet window has elapsed.
    pub(crate) fn fire_due(&mut self, now: Instant) -> Option<T> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|(deadline, _)| *deadline <= now);
        if due { self.disarm() } else { None }
    }

    /// Drops the pending value without firing it.
    pub(crate) fn disarm(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }
}
