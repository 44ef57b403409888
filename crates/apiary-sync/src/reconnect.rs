/// Reconnection timing and bounds.
///
/// Every failure path (transport error, close, heartbeat death,
/// stall-recovery failure) funnels into [`ReconnectPolicy::begin`], which
/// decides whether to schedule a new channel and after how long. At most
/// one reconnection is in flight at a time; exceeding the attempt bound
/// flips a sticky terminal flag that only a manual reset clears.

use std::time::Duration;

use crate::config::SyncConfig;

/// What the session should do about a failed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Open a new channel after `delay`. `attempt` is `None` for the
    /// initial connection (no prior success, no backoff, no counting).
    Schedule { attempt: Option<u32>, delay: Duration },
    /// A reconnection is already in flight; this trigger is a no-op.
    Busy,
    /// Attempt bound exceeded: terminal failure until a manual reset.
    Exhausted,
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    reconnecting: bool,
    exhausted: bool,
    had_success: bool,
    base_delay: Duration,
    growth: f64,
    max_delay: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            attempts: 0,
            reconnecting: false,
            exhausted: false,
            had_success: false,
            base_delay: config.reconnect_base_delay,
            growth: config.reconnect_growth,
            max_delay: config.reconnect_max_delay,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Terminal-failure flag; sticky until [`reset`](Self::reset).
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// `min(cap, base × growth^(attempt-1))`, attempt starting at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self.base_delay.as_millis() as f64 * self.growth.powi(attempt as i32 - 1);
        self.max_delay.min(Duration::from_millis(ms as u64))
    }

    /// Request a reconnection. Only genuine reconnections (a previously
    /// working connection was lost) increment the counter and engage
    /// backoff; the initial attempt retries at the base delay uncounted.
    pub fn begin(&mut self) -> ReconnectDecision {
        if self.reconnecting || self.exhausted {
            return ReconnectDecision::Busy;
        }
        if !self.had_success {
            self.reconnecting = true;
            return ReconnectDecision::Schedule {
                attempt: None,
                delay: self.base_delay,
            };
        }
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.exhausted = true;
            return ReconnectDecision::Exhausted;
        }
        self.reconnecting = true;
        ReconnectDecision::Schedule {
            attempt: Some(self.attempts),
            delay: self.delay_for(self.attempts),
        }
    }

    /// The scheduled timer fired; the in-flight guard lifts just before
    /// the open attempt so a failed open can schedule the next one.
    pub fn fire(&mut self) {
        self.reconnecting = false;
    }

    /// A channel opened successfully: backoff is per-outage, so counter
    /// and delay return to baseline.
    pub fn on_open(&mut self) {
        self.attempts = 0;
        self.reconnecting = false;
        self.had_success = true;
    }

    /// Manual "reconnect now": zero the counter, clear the sticky
    /// terminal flag, connect immediately.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.reconnecting = false;
        self.exhausted = false;
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        let mut p = ReconnectPolicy::new(&SyncConfig::default());
        p.on_open(); // prior success: triggers are genuine reconnections
        p
    }

    #[test]
    fn test_backoff_sequence() {
        let p = policy();
        let expect = [1000u64, 1500, 2250, 3375, 5062];
        for (i, ms) in expect.iter().enumerate() {
            assert_eq!(p.delay_for(i as u32 + 1), Duration::from_millis(*ms));
        }
        // Far attempts are capped.
        assert_eq!(p.delay_for(30), Duration::from_millis(30_000));
    }

    #[test]
    fn test_concurrent_triggers_are_noops() {
        let mut p = policy();
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: Some(1), .. }
        ));
        // Error, close and heartbeat paths racing the scheduled timer.
        assert_eq!(p.begin(), ReconnectDecision::Busy);
        assert_eq!(p.begin(), ReconnectDecision::Busy);
        p.fire();
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: Some(2), .. }
        ));
    }

    #[test]
    fn test_counter_bounded_then_terminal() {
        // Counter at 9, max 10: one more attempt is scheduled; the next
        // failure is terminal and arms no further timers.
        let mut p = policy();
        for _ in 0..9 {
            assert!(matches!(p.begin(), ReconnectDecision::Schedule { .. }));
            p.fire();
        }
        assert_eq!(p.attempts(), 9);
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: Some(10), .. }
        ));
        p.fire();
        assert_eq!(p.begin(), ReconnectDecision::Exhausted);
        assert!(p.is_exhausted());
        assert_eq!(p.begin(), ReconnectDecision::Busy);
    }

    #[test]
    fn test_manual_reset_clears_terminal_state() {
        let mut p = policy();
        for _ in 0..11 {
            p.begin();
            p.fire();
        }
        assert!(p.is_exhausted());
        p.reset();
        assert!(!p.is_exhausted());
        assert_eq!(p.attempts(), 0);
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: Some(1), .. }
        ));
    }

    #[test]
    fn test_success_resets_backoff_per_outage() {
        let mut p = policy();
        for _ in 0..5 {
            p.begin();
            p.fire();
        }
        assert_eq!(p.attempts(), 5);
        p.on_open();
        assert_eq!(p.attempts(), 0);
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: Some(1), .. }
        ));
    }

    #[test]
    fn test_initial_attempt_uncounted() {
        let mut p = ReconnectPolicy::new(&SyncConfig::default());
        assert!(matches!(
            p.begin(),
            ReconnectDecision::Schedule { attempt: None, .. }
        ));
        assert_eq!(p.attempts(), 0);
    }
}
