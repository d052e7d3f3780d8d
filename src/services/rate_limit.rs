//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Debug)]
struct Window {
    count: u32,
    start: DateTime<Utc>,
}

pub struct RateLimiter {
    entries: Mutex<HashMap<String, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), max_requests, window }
    }

    /// Five requests per ten minutes.
    pub fn contact_form() -> Self { Self::new(5, Duration::minutes(10)) }

    /// Records a hit for `key` at `now`; `false` once the window is used up.
    /// Rejected hits are not counted.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(window) = entries.get_mut(key) {
            if now - window.start <= self.window {
                if window.count >= self.max_requests {
                    return false;
                }
                window.count += 1;
                return true;
            }
        }

        let window = self.window;
        entries.retain(|_, w| now - w.start <= window);
        entries.insert(key.to_string(), Window { count: 1, start: now });
        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize { self.entries.lock().unwrap_or_else(PoisonError::into_inner).len() }
}
