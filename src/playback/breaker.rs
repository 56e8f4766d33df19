//! Process-wide circuit breaker for the official search API.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::warn;

/// Suppresses official-API search calls until a deadline after a
/// quota-exhaustion failure. Coarse locking: the critical sections are a few
/// instructions long and reads vastly outnumber writes.
pub struct SearchBreaker {
    cooldown: Duration,
    tripped_until: Mutex<Option<Instant>>,
}

impl SearchBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            tripped_until: Mutex::new(None),
        }
    }

    /// Record a quota failure and start the cooldown.
    pub fn trip(&self) {
        let deadline = Instant::now() + self.cooldown;
        let mut guard = self.tripped_until.lock().expect("breaker lock poisoned");
        *guard = Some(deadline);
        warn!(cooldown_secs = self.cooldown.as_secs(), "search quota exhausted; official API suppressed");
    }

    /// Whether official-API search calls are currently suppressed.
    pub fn is_search_down(&self) -> bool {
        let mut guard = self.tripped_until.lock().expect("breaker lock poisoned");
        match *guard {
            Some(deadline) if deadline > Instant::now() => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let breaker = SearchBreaker::new(Duration::from_secs(60));
        assert!(!breaker.is_search_down());
    }

    #[test]
    fn trip_opens_until_deadline() {
        let breaker = SearchBreaker::new(Duration::from_secs(60));
        breaker.trip();
        assert!(breaker.is_search_down());
    }

    #[test]
    fn reopens_after_cooldown() {
        let breaker = SearchBreaker::new(Duration::from_millis(0));
        breaker.trip();
        // Zero cooldown: the deadline is already in the past.
        assert!(!breaker.is_search_down());
        assert!(!breaker.is_search_down());
    }
}
