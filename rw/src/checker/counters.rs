//! Run outcome counters

use std::sync::Mutex;

/// Success / error / rate-limit tallies for one run
///
/// One lock per counter. Increments come from worker tasks while a run is in
/// flight; reads happen after the join barrier, but still go through the
/// lock.
#[derive(Debug, Default)]
pub struct RunCounters {
    success: Mutex<u32>,
    error: Mutex<u32>,
    ratelimited: Mutex<u32>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        *self.success.lock().unwrap() += 1;
    }

    pub fn record_error(&self) {
        *self.error.lock().unwrap() += 1;
    }

    pub fn record_ratelimited(&self) {
        *self.ratelimited.lock().unwrap() += 1;
    }

    pub fn successes(&self) -> u32 {
        *self.success.lock().unwrap()
    }

    pub fn errors(&self) -> u32 {
        *self.error.lock().unwrap()
    }

    pub fn ratelimited(&self) -> u32 {
        *self.ratelimited.lock().unwrap()
    }
}
