//! Client-side request throttle.
//!
//! The archive enforces a limit that is stricter than the one it advertises
//! and moves around, so the window is left to the caller.

use crate::config::RateLimitConfig;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Window {
    limit: Option<(usize, Duration)>,
    stamps: VecDeque<Instant>,
    total: u64,
}

/// Bounds outgoing requests to `max_requests` per trailing `window`.
///
/// One limiter is meant to be shared (behind an `Arc`) by every
/// [`Requester`](crate::networking::Requester) in the process. The check and the
/// record happen under one lock. A caller that has to wait parks on a condvar
/// and gives the lock up meanwhile, so reconfiguring wakes it at once.
#[derive(Debug, Default)]
pub struct RateLimiter {
    window: Mutex<Window>,
    changed: Condvar,
}

impl RateLimiter {
    /// A limiter that never blocks.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(max_requests: usize, window: Duration) -> Self {
        let limiter = Self::default();
        limiter.configure(max_requests, window);
        limiter
    }

    pub fn from_config(config: Option<RateLimitConfig>) -> Self {
        match config {
            Some(c) => Self::new(c.max_requests, c.window()),
            None => Self::disabled(),
        }
    }

    /// Enables limiting. A `max_requests` of zero disables it instead.
    pub fn configure(&self, max_requests: usize, window: Duration) {
        let mut state = self.window.lock();
        state.limit = (max_requests > 0).then_some((max_requests, window));
        state.stamps.clear();
        self.changed.notify_all();
    }

    pub fn disable(&self) {
        let mut state = self.window.lock();
        state.limit = None;
        state.stamps.clear();
        self.changed.notify_all();
    }

    pub fn is_enabled(&self) -> bool {
        self.window.lock().limit.is_some()
    }

    /// Requests admitted so far, limited or not.
    pub fn total(&self) -> u64 {
        self.window.lock().total
    }

    /// Blocks until one more request fits in the window, records it and
    /// returns the instant it was recorded at.
    pub fn acquire(&self) -> Instant {
        let mut state = self.window.lock();
        state.total += 1;

        loop {
            let Some((max_requests, window)) = state.limit else {
                return Instant::now();
            };
            let now = Instant::now();
            while let Some(oldest) = state.stamps.front() {
                if now.duration_since(*oldest) >= window {
                    state.stamps.pop_front();
                } else {
                    break;
                }
            }
            if state.stamps.len() < max_requests {
                state.stamps.push_back(now);
                return now;
            }
            if let Some(oldest) = state.stamps.front() {
                let wait = (*oldest + window).saturating_duration_since(now);
                debug!("rate limiter full ({max_requests} per {window:?}), waiting {wait:?}");
                self.changed.wait_for(&mut state, wait);
            }
        }
    }
}
