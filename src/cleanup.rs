//! Background sweep of expiring in-memory state.
//!
//! Nonces, rate limit buckets and alert groups would otherwise only be
//! trimmed when the same key is touched again. This job periodically drops
//! whatever has aged out. Sessions are left to lazy expiry on lookup.

use crate::auth::middleware::AppState;
use std::time::Duration;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub nonces: usize,
    pub rate_buckets: usize,
    pub alert_groups: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.nonces + self.rate_buckets + self.alert_groups
    }
}

/// Run one sweep at the state's current time.
pub fn sweep(state: &AppState) -> SweepReport {
    SweepReport {
        nonces: state.auth.purge_expired_nonces(),
        rate_buckets: state.limiter.prune_idle(state.clock.now_millis()),
        alert_groups: state.alerts.purge(state.now()),
    }
}

/// Run the cleanup loop.
///
/// Sweeps every `interval`, forever. Spawn it on the runtime.
pub async fn run_cleanup_loop(state: AppState, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let report = sweep(&state);
        if report.total() > 0 {
            tracing::info!(
                nonces = report.nonces,
                rate_buckets = report.rate_buckets,
                alert_groups = report.alert_groups,
                "Cleanup job completed"
            );
        } else {
            tracing::debug!("Cleanup job found nothing to remove");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertIn;
    use crate::auth::middleware::{enforce_rate_limit, ClientAddr};
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::storage::memory::MemorySnapshotStore;
    use std::sync::Arc;

    #[test]
    fn test_sweep_removes_only_expired_state() {
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let state = AppState::new(
            Config::default(),
            clock.clone(),
            Arc::new(MemorySnapshotStore::new()),
        );

        state.auth.challenge("mobile");
        enforce_rate_limit(&state, &ClientAddr("192.0.2.1".parse().unwrap()), "test").unwrap();
        state.alerts.ingest(
            AlertIn {
                source: "api".to_string(),
                kind: "5xx".to_string(),
                message: "down".to_string(),
                severity: Default::default(),
                fingerprint: None,
                meta: Default::default(),
            },
            state.now(),
        );

        // Nothing has aged out yet
        assert_eq!(sweep(&state), SweepReport::default());

        clock.advance(Duration::from_secs(301));
        let report = sweep(&state);
        assert_eq!(
            report,
            SweepReport {
                nonces: 1,
                rate_buckets: 1,
                alert_groups: 1,
            }
        );
        assert_eq!(report.total(), 3);
        assert_eq!(state.auth.pending_nonces(), 0);
        assert_eq!(state.limiter.tracked_clients(), 0);
    }
}
