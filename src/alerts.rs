//! Alert coalescing.
//!
//! Alerts sharing a fingerprint within the coalesce window collapse into a
//! single group whose count grows and whose severity only escalates. Groups
//! are ranked by a score combining severity, frequency and recency. A short
//! raw buffer keeps the last few seconds of ingested alerts for previews.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{HashMap, VecDeque};

/// Hard cap on the raw preview buffer.
const RAW_BUFFER_CAP: usize = 500;

/// Bounds for `list` page sizes.
pub const LIST_LIMIT_MAX: usize = 200;
pub const LIST_LIMIT_DEFAULT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warn,
    Crit,
}

impl Severity {
    fn weight(self) -> f64 {
        match self {
            Severity::Info => 1.0,
            Severity::Warn => 5.0,
            Severity::Crit => 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertIn {
    pub source: String,
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertGroup {
    pub fp: String,
    pub source: String,
    pub kind: String,
    pub last_message: String,
    pub severity: Severity,
    pub first_ts: u64,
    pub last_ts: u64,
    pub count: u64,
}

impl AlertGroup {
    /// Severity weight × capped frequency × recency boost.
    pub fn score(&self, now: u64) -> f64 {
        let freq = self.count.min(10) as f64;
        let age = now.saturating_sub(self.last_ts).max(1) as f64;
        let recency = (30.0 / age).max(1.0);
        self.severity.weight() * freq * recency
    }
}

/// A group together with its score at listing time.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredGroup {
    #[serde(flatten)]
    pub group: AlertGroup,
    pub score: f64,
}

/// Raw buffer entry.
#[derive(Debug, Clone, Serialize)]
pub struct BufferedAlert {
    pub ts: u64,
    #[serde(flatten)]
    pub alert: AlertIn,
}

#[derive(Debug, Clone, Copy)]
pub struct CoalesceConfig {
    pub coalesce_window_secs: u64,
    pub buffer_window_secs: u64,
    pub group_ttl_secs: u64,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            coalesce_window_secs: 30,
            buffer_window_secs: 10,
            group_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CoalescerStats {
    pub groups: usize,
    pub buffer: usize,
}

#[derive(Default)]
struct State {
    groups: HashMap<String, AlertGroup>,
    raw: VecDeque<BufferedAlert>,
}

impl State {
    fn cleanup(&mut self, now: u64, config: &CoalesceConfig) -> usize {
        while self
            .raw
            .front()
            .is_some_and(|entry| now.saturating_sub(entry.ts) > config.buffer_window_secs)
        {
            self.raw.pop_front();
        }
        let before = self.groups.len();
        self.groups
            .retain(|_, group| now.saturating_sub(group.last_ts) <= config.group_ttl_secs);
        before - self.groups.len()
    }
}

/// Fingerprint: first 16 hex chars of SHA-1 over normalized source, kind and message.
pub fn fingerprint(source: &str, kind: &str, message: &str) -> String {
    let raw = format!(
        "{}|{}|{}",
        source.trim().to_lowercase(),
        kind.trim().to_lowercase(),
        message.trim().to_lowercase()
    );
    let digest = format!("{:x}", Sha1::digest(raw.as_bytes()));
    digest[..16].to_string()
}

pub struct AlertCoalescer {
    config: CoalesceConfig,
    state: Mutex<State>,
}

impl AlertCoalescer {
    pub fn new(config: CoalesceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Record an alert, returning its (possibly new) group.
    pub fn ingest(&self, mut alert: AlertIn, now: u64) -> AlertGroup {
        let fp = match alert.fingerprint.as_deref().map(str::trim) {
            Some(fp) if !fp.is_empty() => fp.to_string(),
            _ => fingerprint(&alert.source, &alert.kind, &alert.message),
        };
        alert.fingerprint = Some(fp.clone());

        let mut state = self.state.lock();
        state.cleanup(now, &self.config);

        state.raw.push_back(BufferedAlert {
            ts: now,
            alert: alert.clone(),
        });
        while state.raw.len() > RAW_BUFFER_CAP {
            state.raw.pop_front();
        }

        let window = self.config.coalesce_window_secs;
        match state.groups.get_mut(&fp) {
            Some(group) if now.saturating_sub(group.last_ts) <= window => {
                group.count += 1;
                group.last_ts = now;
                group.last_message = alert.message;
                group.severity = group.severity.max(alert.severity);
                group.clone()
            }
            _ => {
                let group = AlertGroup {
                    fp: fp.clone(),
                    source: alert.source,
                    kind: alert.kind,
                    last_message: alert.message,
                    severity: alert.severity,
                    first_ts: now,
                    last_ts: now,
                    count: 1,
                };
                state.groups.insert(fp, group.clone());
                group
            }
        }
    }

    /// Groups ranked by score, then by most recent activity.
    pub fn list(&self, limit: usize, now: u64) -> Vec<ScoredGroup> {
        let limit = limit.clamp(1, LIST_LIMIT_MAX);
        let mut state = self.state.lock();
        state.cleanup(now, &self.config);

        let mut scored: Vec<ScoredGroup> = state
            .groups
            .values()
            .map(|group| ScoredGroup {
                score: group.score(now),
                group: group.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.group.last_ts.cmp(&a.group.last_ts))
        });
        scored.truncate(limit);
        scored
    }

    pub fn buffer(&self, now: u64) -> Vec<BufferedAlert> {
        let mut state = self.state.lock();
        state.cleanup(now, &self.config);
        state.raw.iter().cloned().collect()
    }

    /// Close a group. Returns whether it existed.
    pub fn resolve(&self, fp: &str) -> bool {
        self.state.lock().groups.remove(fp).is_some()
    }

    /// Drop stale groups and aged buffer entries. Returns groups removed.
    pub fn purge(&self, now: u64) -> usize {
        self.state.lock().cleanup(now, &self.config)
    }

    pub fn stats(&self, now: u64) -> CoalescerStats {
        let mut state = self.state.lock();
        state.cleanup(now, &self.config);
        CoalescerStats {
            groups: state.groups.len(),
            buffer: state.raw.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(message: &str, severity: Severity) -> AlertIn {
        AlertIn {
            source: "gateway".to_string(),
            kind: "timeout".to_string(),
            message: message.to_string(),
            severity,
            fingerprint: None,
            meta: Default::default(),
        }
    }

    #[test]
    fn test_fingerprint_normalizes() {
        let a = fingerprint("Gateway ", "TIMEOUT", " upstream slow");
        let b = fingerprint("gateway", "timeout", "upstream slow");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, fingerprint("gateway", "timeout", "other"));
    }

    #[test]
    fn test_coalesce_within_window() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());

        let first = coalescer.ingest(alert("upstream slow", Severity::Warn), 1_000);
        let second = coalescer.ingest(alert("upstream slow", Severity::Info), 1_020);

        assert_eq!(first.fp, second.fp);
        assert_eq!(second.count, 2);
        assert_eq!(second.first_ts, 1_000);
        assert_eq!(second.last_ts, 1_020);
        // Severity never downgrades
        assert_eq!(second.severity, Severity::Warn);
    }

    #[test]
    fn test_severity_escalates() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        coalescer.ingest(alert("disk", Severity::Info), 0);
        let group = coalescer.ingest(alert("disk", Severity::Crit), 5);
        assert_eq!(group.severity, Severity::Crit);
    }

    #[test]
    fn test_new_group_after_window() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        coalescer.ingest(alert("upstream slow", Severity::Warn), 1_000);

        let group = coalescer.ingest(alert("upstream slow", Severity::Warn), 1_031);
        assert_eq!(group.count, 1);
        assert_eq!(group.first_ts, 1_031);
    }

    #[test]
    fn test_explicit_fingerprint_groups_different_messages() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        let mut a = alert("one", Severity::Warn);
        a.fingerprint = Some("billing-quota".to_string());
        let mut b = alert("two", Severity::Warn);
        b.fingerprint = Some("billing-quota".to_string());

        coalescer.ingest(a, 0);
        let group = coalescer.ingest(b, 1);
        assert_eq!(group.fp, "billing-quota");
        assert_eq!(group.count, 2);
        assert_eq!(group.last_message, "two");
    }

    #[test]
    fn test_score() {
        let group = AlertGroup {
            fp: "f".to_string(),
            source: "s".to_string(),
            kind: "k".to_string(),
            last_message: "m".to_string(),
            severity: Severity::Crit,
            first_ts: 0,
            last_ts: 100,
            count: 25,
        };
        // Fresh: recency = 30 / 1
        assert_eq!(group.score(100), 10.0 * 10.0 * 30.0);
        // Old: recency floors at 1
        assert_eq!(group.score(400), 100.0);
    }

    #[test]
    fn test_list_orders_by_score() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        coalescer.ingest(alert("minor", Severity::Info), 100);
        coalescer.ingest(alert("major", Severity::Crit), 100);
        coalescer.ingest(alert("medium", Severity::Warn), 100);

        let listed = coalescer.list(LIST_LIMIT_DEFAULT, 100);
        let messages: Vec<&str> = listed.iter().map(|g| g.group.last_message.as_str()).collect();
        assert_eq!(messages, vec!["major", "medium", "minor"]);

        assert_eq!(coalescer.list(1, 100).len(), 1);
        // Zero is clamped up to one
        assert_eq!(coalescer.list(0, 100).len(), 1);
    }

    #[test]
    fn test_buffer_window() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        coalescer.ingest(alert("a", Severity::Warn), 100);
        coalescer.ingest(alert("b", Severity::Warn), 105);

        assert_eq!(coalescer.buffer(108).len(), 2);
        let recent = coalescer.buffer(112);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].alert.message, "b");
    }

    #[test]
    fn test_groups_expire_and_resolve() {
        let coalescer = AlertCoalescer::new(CoalesceConfig::default());
        let group = coalescer.ingest(alert("a", Severity::Warn), 0);
        coalescer.ingest(alert("b", Severity::Warn), 200);

        assert!(coalescer.resolve(&group.fp));
        assert!(!coalescer.resolve(&group.fp));

        assert_eq!(coalescer.stats(200).groups, 1);
        assert_eq!(coalescer.purge(501), 1);
        assert_eq!(coalescer.stats(501).groups, 0);
    }
}
