//! Reconnection with exponential backoff.
//!
//! `monitor` loses its controller when the daemon restarts or the Wave:3 is
//! unplugged. [`ReconnectState`] paces the retries so a missing device is not
//! polled in a tight loop.

use std::time::{Duration, Instant};

use crate::error::Result;

/// Configuration for reconnection backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Applied to the delay after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Backoff state machine.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReconnectConfig::default())
    }

    /// `true` before the first attempt or once the backoff delay has elapsed.
    pub fn should_attempt(&self) -> bool {
        self.last_attempt
            .is_none_or(|last| last.elapsed() >= self.current_delay)
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());
        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
        self.last_attempt = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

/// Run `connect` if the backoff allows it.
///
/// Returns `None` without calling `connect` while the timer is pending, and
/// `None` (after logging the next retry) when `connect` fails.
pub fn try_reconnect<T>(
    state: &mut ReconnectState,
    connect: impl FnOnce() -> Result<T>,
) -> Option<T> {
    if !state.should_attempt() {
        return None;
    }
    match connect() {
        Ok(v) => {
            if state.consecutive_failures() > 0 {
                log::info!(
                    "reconnected after {} failed attempt(s)",
                    state.consecutive_failures()
                );
            }
            state.record_success();
            Some(v)
        }
        Err(e) => {
            state.record_failure();
            log::warn!(
                "reconnect failed: {e} (attempt {}, retry in {:.1}s)",
                state.consecutive_failures(),
                state.current_delay().as_secs_f64()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Wave3Error;
    use crate::proxy::ProxyError;

    fn fast() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut state = ReconnectState::new(fast());
        assert_eq!(state.current_delay(), Duration::from_millis(100));
        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_millis(200));
        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_millis(350));
        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_millis(350));
        assert_eq!(state.consecutive_failures(), 3);
    }

    #[test]
    fn success_resets() {
        let mut state = ReconnectState::new(fast());
        state.record_failure();
        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_millis(100));
        assert!(state.should_attempt());
    }

    #[test]
    fn pending_backoff_skips_connect() {
        let mut state = ReconnectState::new(ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            ..ReconnectConfig::default()
        });
        let first: Option<()> =
            try_reconnect(&mut state, || Err(Wave3Error::Proxy(ProxyError::DeviceNotFound)));
        assert!(first.is_none());
        assert_eq!(state.consecutive_failures(), 1);

        let mut called = false;
        let second = try_reconnect(&mut state, || {
            called = true;
            Ok(())
        });
        assert!(second.is_none());
        assert!(!called);
    }

    #[test]
    fn retry_after_delay_succeeds() {
        let mut state = ReconnectState::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let failed: Option<u8> =
            try_reconnect(&mut state, || Err(Wave3Error::Protocol("x".into())));
        assert!(failed.is_none());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(try_reconnect(&mut state, || Ok(7u8)), Some(7));
        assert_eq!(state.consecutive_failures(), 0);
    }
}
