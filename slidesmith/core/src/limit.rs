//! Request limiting for model calls
//!
//! A fixed-window counter per key. The limiter is an ordinary value: whoever
//! builds an event source decides whether to hand it one, and tests create
//! their own isolated instances.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use slidesmith_core::limit::RequestLimiter;
//!
//! let limiter = RequestLimiter::new(2, Duration::from_secs(60));
//! assert!(limiter.check("openai").is_ok());
//! assert!(limiter.check("openai").is_ok());
//! assert!(limiter.check("openai").is_err());
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

/// A request was refused by the limiter
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Rate limit exceeded for {key}: {limit} requests per {window_secs}s, retry in {retry_after_secs}s")]
pub struct RateLimited {
    /// Key that hit the limit
    pub key: String,
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Seconds until the window resets
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter
#[derive(Debug)]
pub struct RequestLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RequestLimiter {
    /// Allow `max_requests` per `window` per key; 0 disables limiting
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that allows everything
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether the limiter counts anything
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Count one request for `key`
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the key has used up its window.
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at a given instant
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the key has used up its window.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut windows = self.windows.lock();
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(elapsed);
            tracing::warn!(key, limit = self.max_requests, "Request limit reached");
            return Err(RateLimited {
                key: key.to_string(),
                limit: self.max_requests,
                window_secs: self.window.as_secs(),
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Requests left in the current window for `key`
    #[must_use]
    pub fn remaining(&self, key: &str) -> u32 {
        if !self.is_enabled() {
            return u32::MAX;
        }
        let windows = self.windows.lock();
        match windows.get(key) {
            Some(w) if w.started.elapsed() < self.window => self.max_requests.saturating_sub(w.count),
            _ => self.max_requests,
        }
    }
}
