//! Periodic status broadcast.
//!
//! Every connected client gets the current drive state at a fixed wall-clock
//! interval, whether or not commands are flowing.

use embassy_time::{Duration, Instant, Ticker};
use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};

use super::channel::{OutboundChannel, PubSubTransport};
use crate::utils::controllers::SharedController;

/// How often the heartbeat task checks whether a beat is due.
pub const POLL_MS: u64 = 100;

/// Tracks when the last broadcast went out.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval_ms: u64,
    last_beat_ms: u64,
}

impl Heartbeat {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_beat_ms: 0,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Returns `true` and restarts the interval when a beat is due at `now_ms`.
    pub fn due(
        &mut self,
        now_ms: u64,
    ) -> bool {
        if now_ms.saturating_sub(self.last_beat_ms) >= self.interval_ms {
            self.last_beat_ms = now_ms;
            true
        } else {
            false
        }
    }
}

/// Drive the heartbeat of `controller` forever.
pub async fn run<Dir, Pwm, D>(
    controller: &'static SharedController<Dir, Pwm, D>,
    outbound: &'static OutboundChannel,
) -> !
where
    Dir: OutputPin,
    Pwm: SetDutyCycle,
    D: DelayNs,
{
    let mut ticker = Ticker::every(Duration::from_millis(POLL_MS));
    let mut transport = PubSubTransport::new(outbound);
    tracing::info!("heartbeat task started");
    loop {
        ticker.next().await;
        let now = Instant::now().as_millis();
        controller.lock().await.tick(now, &mut transport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_beat_after_one_interval() {
        let mut hb = Heartbeat::new(5000);
        assert!(!hb.due(0));
        assert!(!hb.due(4999));
        assert!(hb.due(5000));
    }

    #[test]
    fn interval_restarts_from_last_beat() {
        let mut hb = Heartbeat::new(5000);
        assert!(hb.due(5200));
        assert!(!hb.due(10_100));
        assert!(hb.due(10_200));
        assert!(!hb.due(10_200));
    }

    #[test]
    fn late_tick_fires_once() {
        let mut hb = Heartbeat::new(5000);
        assert!(hb.due(23_000));
        assert!(!hb.due(23_001));
    }
}
