//! Reconnect scheduling: retry forever at a fixed interval, alerting on
//! every failed attempt.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::connection::FieldControlError;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    /// Upper bound on one attempt: login, dial and handshake together.
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    /// Retry every `interval`, giving each attempt the same amount of time.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            connect_timeout: interval,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_RECONNECT_INTERVAL)
    }
}

/// Raised once per failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Consecutive failures so far, starting at 1.
    pub attempt: u32,
    pub message: String,
}

#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    next_attempt: Option<Instant>,
    failures: u32,
}

impl Supervisor {
    /// A supervisor that wants to connect right away.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            next_attempt: Some(Instant::now()),
            failures: 0,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.policy.connect_timeout
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_scheduled(&self) -> bool {
        self.next_attempt.is_some()
    }

    /// Attempt again without waiting.
    pub fn schedule_now(&mut self) {
        self.next_attempt = Some(Instant::now());
    }

    pub fn on_connected(&mut self) {
        if self.failures > 0 {
            tracing::info!("Reconnected after {} failed attempts", self.failures);
        }
        self.failures = 0;
        self.next_attempt = None;
    }

    /// The stream dropped after being open; wait one interval before retrying.
    pub fn on_disconnected(&mut self) {
        self.next_attempt = Some(Instant::now() + self.policy.interval);
    }

    pub fn on_failure(&mut self, err: &FieldControlError) -> Alert {
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Some(Instant::now() + self.policy.interval);
        tracing::warn!(
            "Connection attempt {} failed: {} (retrying in {:?})",
            self.failures,
            err,
            self.policy.interval
        );
        Alert {
            attempt: self.failures,
            message: err.to_string(),
        }
    }

    /// Resolves when the next attempt is due; never, if none is scheduled.
    pub async fn wait(&self) {
        match self.next_attempt {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_count_and_alert() {
        let mut sup = Supervisor::new(ReconnectPolicy::every(Duration::from_millis(5)));
        for n in 1..=3 {
            sup.wait().await;
            let alert = sup.on_failure(&FieldControlError::Connect("refused".into()));
            assert_eq!(alert.attempt, n);
            assert!(alert.message.contains("refused"));
        }
        assert_eq!(sup.failures(), 3);
        sup.on_connected();
        assert_eq!(sup.failures(), 0);
        assert!(!sup.is_scheduled());
    }

    #[tokio::test]
    async fn test_backoff_interval() {
        let interval = Duration::from_millis(30);
        let mut sup = Supervisor::new(ReconnectPolicy::every(interval));
        sup.on_failure(&FieldControlError::Closed);
        let started = Instant::now();
        sup.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_idle_when_connected() {
        let mut sup = Supervisor::new(ReconnectPolicy::default());
        sup.on_connected();
        let waited = tokio::time::timeout(Duration::from_millis(20), sup.wait()).await;
        assert!(waited.is_err());
    }
}
