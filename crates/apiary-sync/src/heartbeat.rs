/// Liveness tracking for one channel.
///
/// Detects silent connection death that neither an error nor a close event
/// surfaces: the collector simply stops answering. The monitor is pure
/// state over instants; the session owns the probe interval and feeds
/// every inbound frame in as a liveness signal.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::SyncConfig;

/// Verdict for the current silence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// Soft threshold crossed: report "unstable" but keep the channel open.
    Unstable,
    /// Hard threshold crossed: close the channel and reconnect.
    Dead,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    last_seen: Instant,
    probe_sent_at: Option<Instant>,
    heartbeat_deadline: Duration,
    unstable_after: Duration,
    dead_after: Duration,
    idle_probe_after: Duration,
}

impl HeartbeatMonitor {
    pub fn new(config: &SyncConfig, now: Instant) -> Self {
        Self {
            last_seen: now,
            probe_sent_at: None,
            heartbeat_deadline: config.heartbeat_deadline,
            unstable_after: config.unstable_after,
            dead_after: config.dead_after,
            idle_probe_after: config.idle_probe_after,
        }
    }

    /// Any inbound traffic counts as a liveness signal and cancels the
    /// outstanding probe deadline.
    pub fn on_activity(&mut self, now: Instant) {
        self.last_seen = now;
        self.probe_sent_at = None;
    }

    /// A heartbeat probe went out at `now`.
    pub fn on_probe_sent(&mut self, now: Instant) {
        if self.probe_sent_at.is_none() {
            self.probe_sent_at = Some(now);
        }
    }

    /// True while a probe has gone unanswered past its response deadline.
    pub fn probe_overdue(&self, now: Instant) -> bool {
        self.probe_sent_at
            .is_some_and(|sent| now.duration_since(sent) > self.heartbeat_deadline)
    }

    /// Time since the last liveness signal.
    pub fn silence(&self, now: Instant) -> Duration {
        now.duration_since(self.last_seen)
    }

    /// Classify the current silence window against the soft and hard
    /// thresholds. A probe unanswered past its response deadline counts as
    /// unstable even inside the soft window.
    pub fn assess(&self, now: Instant) -> Liveness {
        let silence = self.silence(now);
        if silence >= self.dead_after {
            Liveness::Dead
        } else if silence >= self.unstable_after || self.probe_overdue(now) {
            Liveness::Unstable
        } else {
            Liveness::Healthy
        }
    }

    /// Whether an external wake trigger (tab visible again, network back)
    /// should issue a lightweight ping: only when the channel has been
    /// idle beyond the staleness threshold.
    pub fn should_ping(&self, now: Instant) -> bool {
        self.silence(now) >= self.idle_probe_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyncConfig {
        SyncConfig {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_deadline: Duration::from_secs(10),
            unstable_after: Duration::from_secs(40),
            dead_after: Duration::from_secs(120),
            idle_probe_after: Duration::from_secs(10),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_healthy_run_never_escalates() {
        // Responses arrive within the deadline on every cycle: no
        // stale-connection verdict over an arbitrarily long run.
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(&config(), start);
        let mut now = start;
        for _ in 0..1000 {
            now += Duration::from_secs(30);
            assert_eq!(monitor.assess(now), Liveness::Healthy);
            monitor.on_probe_sent(now);
            // Response 5s later, inside the 10s deadline.
            now += Duration::from_secs(5);
            monitor.on_activity(now);
            assert!(!monitor.probe_overdue(now));
            now -= Duration::from_secs(5);
        }
    }

    #[test]
    fn test_soft_then_hard_threshold() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::new(&config(), start);
        assert_eq!(monitor.assess(start + Duration::from_secs(30)), Liveness::Healthy);
        assert_eq!(monitor.assess(start + Duration::from_secs(41)), Liveness::Unstable);
        assert_eq!(monitor.assess(start + Duration::from_secs(119)), Liveness::Unstable);
        assert_eq!(monitor.assess(start + Duration::from_secs(120)), Liveness::Dead);
    }

    #[test]
    fn test_overdue_probe_downgrades_to_unstable() {
        // Silence is still inside the soft window, but the probe response
        // deadline has passed: the verdict drops to unstable.
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(&config(), start);
        monitor.on_probe_sent(start);
        assert_eq!(monitor.assess(start + Duration::from_secs(9)), Liveness::Healthy);
        assert_eq!(monitor.assess(start + Duration::from_secs(11)), Liveness::Unstable);
        // An answer restores the healthy verdict.
        monitor.on_activity(start + Duration::from_secs(11));
        assert_eq!(monitor.assess(start + Duration::from_secs(12)), Liveness::Healthy);
    }

    #[test]
    fn test_activity_cancels_probe_deadline() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(&config(), start);
        monitor.on_probe_sent(start);
        assert!(monitor.probe_overdue(start + Duration::from_secs(11)));
        monitor.on_activity(start + Duration::from_secs(11));
        assert!(!monitor.probe_overdue(start + Duration::from_secs(30)));
    }

    #[test]
    fn test_ping_only_when_idle() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::new(&config(), start);
        assert!(!monitor.should_ping(start + Duration::from_secs(3)));
        assert!(monitor.should_ping(start + Duration::from_secs(10)));
    }
}
