use std::time::Duration;

/// Tuning for a [`crate::Session`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often runtime info and the timer table are requested
    pub poll_interval: Duration,
    /// Upper bound on received bytes held while waiting for the rest of a frame
    pub max_buffered: usize,
    /// How many setting requests may wait for the session before callers are held back
    pub request_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_buffered: 1024,
            request_queue: 16,
        }
    }
}
