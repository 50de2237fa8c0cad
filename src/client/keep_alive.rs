use std::time::Duration;

use tokio::time::{Instant, Interval};

pub(crate) enum KeepAlive {
    /// Time to write a PINGREQ.
    PingRequest,
    /// No traffic from the broker for 1.5 keep alive periods.
    PingResponseDeadline,
}

/// Ping schedule and silence deadline for one connection.
///
/// Disarmed between connections, so [`wait`](KeepAliveTimer::wait) never
/// resolves while the transport is down. While armed, the ping side fires
/// every keep alive period and the deadline side fires after one and a half
/// periods without [`touch`](KeepAliveTimer::touch) being called.
pub(crate) struct KeepAliveTimer {
    timer: Option<(Interval, Interval)>,
}

impl KeepAliveTimer {
    pub fn new() -> Self {
        Self { timer: None }
    }

    /// Start the schedule, counting from now. A zero duration disables it.
    pub fn arm(&mut self, keep_alive: Duration) {
        if keep_alive.is_zero() {
            self.timer = None;
            return;
        }

        let deadline = keep_alive + keep_alive / 2;
        self.timer = Some((
            tokio::time::interval_at(Instant::now() + keep_alive, keep_alive),
            tokio::time::interval_at(Instant::now() + deadline, deadline),
        ));
    }

    pub fn disarm(&mut self) {
        self.timer = None;
    }

    /// Push the deadline out. Call on every packet from the broker.
    pub fn touch(&mut self) {
        if let Some((_, deadline)) = &mut self.timer {
            deadline.reset();
        }
    }

    pub async fn wait(&mut self) -> KeepAlive {
        match &mut self.timer {
            Some((ping, deadline)) => {
                tokio::select! {
                    _ = ping.tick() => KeepAlive::PingRequest,
                    _ = deadline.tick() => KeepAlive::PingResponseDeadline,
                }
            }
            None => futures::future::pending().await,
        }
    }
}
