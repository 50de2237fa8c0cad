use std::time::Duration;

/// Bounded linear backoff for reconnection attempts.
///
/// The delay before attempt `n` is `2 * n * base`. Past the attempt cap the
/// counter wraps back to 1 rather than saturating, and a successful
/// transport connect resets it.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    cap: u32,
    retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: u32) -> Self {
        Self {
            base,
            cap: cap.max(1),
            retries: 1,
        }
    }

    /// Delay to wait before the next attempt. Advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base * (2 * self.retries);
        self.retries = if self.retries >= self.cap {
            1
        } else {
            self.retries + 1
        };
        delay
    }

    pub fn reset(&mut self) {
        self.retries = 1;
    }
}
