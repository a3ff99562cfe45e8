use crate::types::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored value together with its key-level expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// Expiry time as milliseconds since UNIX epoch. None = no expiry.
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<u64>) -> Self {
        Entry { value, expires_at }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Time-to-live in seconds, or -1 if no expiry.
    pub fn ttl_seconds(&self) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => ((exp.saturating_sub(now_millis()) + 500) / 1000) as i64,
        }
    }

    /// Time-to-live in milliseconds, or -1 if no expiry.
    pub fn ttl_millis(&self) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => exp.saturating_sub(now_millis()) as i64,
        }
    }
}

/// Get current time in milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
