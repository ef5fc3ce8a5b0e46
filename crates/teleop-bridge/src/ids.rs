//! Correlation ids for outbound requests.
//!
//! Every frame the session sends carries an `id` that must be unique among
//! outstanding requests. The source is injected into
//! [`BridgeSession`][crate::session::BridgeSession] so tests can pin the
//! exact sequence.

use chrono::Utc;
use uuid::Uuid;

/// Supplies the `id` field of outbound frames.
pub trait IdSource {
    /// Return a fresh id for a request of kind `op` (`"subscribe"`, …).
    fn next_id(&mut self, op: &str) -> String;
}

/// `<op>:<unix-millis>:<random suffix>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIdSource;

impl IdSource for TimestampIdSource {
    fn next_id(&mut self, op: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{op}:{}:{}", Utc::now().timestamp_millis(), &suffix[..12])
    }
}

/// `<op>:<n>` with `n` counting up from 1 across all ops.
#[derive(Debug, Default, Clone)]
pub struct SequentialIdSource {
    next: u64,
}

impl SequentialIdSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIdSource {
    fn next_id(&mut self, op: &str) -> String {
        self.next += 1;
        format!("{op}:{}", self.next)
    }
}
