//! Strictly monotonic nanosecond clock
//!
//! Order creation times break price ties, so no two calls may observe the
//! same instant, and the clock must never run behind anything already
//! committed (it is seeded from the recovered ledger).

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// A clock whose first reading is greater than `floor`.
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Unix nanos, strictly greater than every previous reading.
    pub fn now(&self) -> i64 {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
