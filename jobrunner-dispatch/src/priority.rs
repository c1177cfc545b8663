use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

impl Priority {
    fn flipped(self) -> Self {
        match self {
            Priority::High => Priority::Low,
            Priority::Low => Priority::High,
        }
    }
}

/// Per-loop time-sharing state. High priority holds the loop for up to
/// `lp_max_delay` before yielding, low for up to `hp_max_delay`; with
/// `hp_max_delay < lp_max_delay` high-priority work dominates while
/// low-priority starvation stays bounded. A refill that found free slots
/// but nothing to dispatch flips immediately instead of burning the rest
/// of the window on an empty class.
#[derive(Debug, Clone, Copy)]
pub struct PriorityState {
    pub priority: Priority,
    pub since: Instant,
}

impl PriorityState {
    pub fn new(now: Instant) -> Self {
        Self {
            priority: Priority::High,
            since: now,
        }
    }

    /// Timer-driven rotation. Returns true if the priority flipped, so
    /// the caller can suppress a second (forced) flip in the same
    /// iteration.
    pub fn advance(
        &mut self,
        now: Instant,
        hp_max_delay: Duration,
        lp_max_delay: Duration,
    ) -> bool {
        let window = match self.priority {
            Priority::High => lp_max_delay,
            Priority::Low => hp_max_delay,
        };
        if now.duration_since(self.since) > window {
            self.flip(now);
            true
        } else {
            false
        }
    }

    pub fn flip(&mut self, now: Instant) {
        self.priority = self.priority.flipped();
        self.since = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HP: Duration = Duration::from_secs(30);
    const LP: Duration = Duration::from_secs(60);

    #[test]
    fn starts_high() {
        let now = Instant::now();
        assert_eq!(PriorityState::new(now).priority, Priority::High);
    }

    #[test]
    fn high_yields_after_the_low_delay_window() {
        let start = Instant::now();
        let mut state = PriorityState::new(start);

        assert!(!state.advance(start + LP, HP, LP));
        assert_eq!(state.priority, Priority::High);

        assert!(state.advance(start + LP + Duration::from_secs(1), HP, LP));
        assert_eq!(state.priority, Priority::Low);
    }

    #[test]
    fn low_yields_after_the_high_delay_window() {
        let start = Instant::now();
        let mut state = PriorityState::new(start);
        state.flip(start);
        assert_eq!(state.priority, Priority::Low);

        assert!(!state.advance(start + HP, HP, LP));
        assert!(state.advance(start + HP + Duration::from_secs(1), HP, LP));
        assert_eq!(state.priority, Priority::High);
        assert_eq!(state.since, start + HP + Duration::from_secs(1));
    }

    #[test]
    fn forced_flip_resets_the_window() {
        // A loop that came up high at t=0 and found nothing to dispatch
        // at t=5 hands the window to low-priority work right away.
        let start = Instant::now();
        let t5 = start + Duration::from_secs(5);
        let mut state = PriorityState::new(start);

        state.flip(t5);
        assert_eq!(state.priority, Priority::Low);
        assert_eq!(state.since, t5);
    }

    #[test]
    fn advance_flips_at_most_once_per_call() {
        let start = Instant::now();
        let mut state = PriorityState::new(start);
        // Way past both windows; still a single transition
        let late = start + Duration::from_secs(3600);
        assert!(state.advance(late, HP, LP));
        assert_eq!(state.priority, Priority::Low);
        assert_eq!(state.since, late);
        // And the fresh window means an immediate re-advance does nothing
        assert!(!state.advance(late, HP, LP));
    }
}
