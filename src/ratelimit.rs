//! ratelimit.rs — fixed-window request counters keyed by opaque strings.
//!
//! This is abuse prevention, not fairness: bursts straddling a window
//! boundary can momentarily reach 2× the nominal limit, which is accepted.
//! State is process-local and in-memory; a cold start resets every counter,
//! and under horizontal scaling the effective rate is `limit × instances`.
//!
//! Limiters are plain values owned by the composition root and injected into
//! the gate, never module-level singletons, so the core stays testable.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Default cap on tracked keys before eviction kicks in.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Thread-safe fixed-window counter over string keys.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl FixedWindowLimiter {
    /// `limit` requests per `window_secs` seconds, per key.
    pub fn new(limit: u32, window_secs: i64) -> Self {
        Self::with_capacity(limit, window_secs, DEFAULT_MAX_ENTRIES)
    }

    /// Same, with an explicit cap on tracked keys.
    pub fn with_capacity(limit: u32, window_secs: i64, max_entries: usize) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::seconds(window_secs.max(1)),
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the request is allowed; denied requests leave the
    /// counter unchanged so hammering stays denied until the window turns.
    pub fn allow(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        if let Some(entry) = entries.get_mut(key) {
            if now <= entry.reset_at {
                if entry.count >= self.limit {
                    return false;
                }
                entry.count += 1;
                return true;
            }
            // Window turned over; start a fresh one.
            *entry = WindowEntry {
                count: 1,
                reset_at: now + self.window,
            };
            return true;
        }

        if entries.len() >= self.max_entries {
            self.evict(&mut entries, now);
        }
        entries.insert(
            key.to_string(),
            WindowEntry {
                count: 1,
                reset_at: now + self.window,
            },
        );
        true
    }

    /// Number of tracked keys (diagnostics/tests).
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().expect("rate limiter mutex poisoned").len()
    }

    /// Drop expired windows; if every window is still live, drop the one
    /// closest to expiry so the map stays bounded.
    fn evict(&self, entries: &mut HashMap<String, WindowEntry>, now: DateTime<Utc>) {
        entries.retain(|_, e| now <= e.reset_at);
        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.reset_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }
    }
}
