//! Resize budget ledger: a pure derivation over persisted event history.
//!
//! Deliberately stateless. Any in-process counter would be lost on
//! restart and silently grant unlimited extra budget, so the rolling
//! window is recomputed from the durable event list on every evaluation.

use chrono::{DateTime, Duration, Utc};
use volgres_models::{AutoResizeEvent, ResizeResult, VolumeIdentity};

/// The rolling window resize budgets are counted over
pub fn window() -> Duration {
    Duration::hours(24)
}

/// Count the actions charged against `identity` in the trailing window.
///
/// `success` and `failed` results both consumed a real request against
/// the storage provider; `blocked` records are audit-only and free.
pub fn actions_in_window(
    events: &[AutoResizeEvent],
    identity: &VolumeIdentity,
    now: DateTime<Utc>,
) -> u32 {
    let cutoff = now - window();
    events
        .iter()
        .filter(|e| e.result != ResizeResult::Blocked)
        .filter(|e| e.occurred_at > cutoff && e.occurred_at <= now)
        .filter(|e| e.identity() == *identity)
        .count() as u32
}

/// Remaining actions for `identity`, never below zero
pub fn remaining_budget(
    events: &[AutoResizeEvent],
    identity: &VolumeIdentity,
    max_actions_per_day: u32,
    now: DateTime<Utc>,
) -> u32 {
    max_actions_per_day.saturating_sub(actions_in_window(events, identity, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use volgres_models::VolumeRole;

    fn event(
        cluster: &str,
        role: VolumeRole,
        result: ResizeResult,
        age_hours: i64,
        now: DateTime<Utc>,
    ) -> AutoResizeEvent {
        AutoResizeEvent {
            cluster: cluster.to_string(),
            instance: format!("{}-1", cluster),
            pvc_name: format!("{}-1-{}", cluster, role),
            role,
            tablespace: None,
            old_size_bytes: 1,
            new_size_bytes: 2,
            reason: "test".to_string(),
            result,
            occurred_at: now - Duration::hours(age_hours),
        }
    }

    #[test]
    fn test_empty_history_full_budget() {
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        assert_eq!(remaining_budget(&[], &id, 2, Utc::now()), 2);
    }

    #[test]
    fn test_one_recent_success_exhausts_budget_of_one() {
        // maxActionsPerDay=1, one success 2 hours ago: second trigger
        // must find the budget exhausted
        let now = Utc::now();
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let events = vec![event("prod", VolumeRole::Data, ResizeResult::Success, 2, now)];

        assert_eq!(actions_in_window(&events, &id, now), 1);
        assert_eq!(remaining_budget(&events, &id, 1, now), 0);
    }

    #[test]
    fn test_events_outside_window_do_not_count() {
        let now = Utc::now();
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let events = vec![
            event("prod", VolumeRole::Data, ResizeResult::Success, 25, now),
            event("prod", VolumeRole::Data, ResizeResult::Success, 48, now),
        ];
        assert_eq!(remaining_budget(&events, &id, 1, now), 1);
    }

    #[test]
    fn test_blocked_events_never_consume_budget() {
        let now = Utc::now();
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let events = vec![
            event("prod", VolumeRole::Data, ResizeResult::Blocked, 1, now),
            event("prod", VolumeRole::Data, ResizeResult::Blocked, 2, now),
        ];
        assert_eq!(remaining_budget(&events, &id, 1, now), 1);
    }

    #[test]
    fn test_failed_attempts_consume_budget() {
        let now = Utc::now();
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let events = vec![event("prod", VolumeRole::Data, ResizeResult::Failed, 1, now)];
        assert_eq!(remaining_budget(&events, &id, 2, now), 1);
    }

    #[test]
    fn test_identities_are_independent() {
        let now = Utc::now();
        let data = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let wal = VolumeIdentity::new("prod", VolumeRole::Wal, None);
        let other = VolumeIdentity::new("staging", VolumeRole::Data, None);

        let events = vec![event("prod", VolumeRole::Data, ResizeResult::Success, 1, now)];
        assert_eq!(remaining_budget(&events, &data, 1, now), 0);
        assert_eq!(remaining_budget(&events, &wal, 1, now), 1);
        assert_eq!(remaining_budget(&events, &other, 1, now), 1);
    }

    #[test]
    fn test_one_more_success_decrements_by_exactly_one() {
        let now = Utc::now();
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let mut events = vec![event("prod", VolumeRole::Data, ResizeResult::Success, 3, now)];

        let before = remaining_budget(&events, &id, 4, now);
        events.push(event("prod", VolumeRole::Data, ResizeResult::Success, 0, now));
        let after = remaining_budget(&events, &id, 4, now);
        assert_eq!(before - after, 1);

        // ... and stays pinned at zero once exhausted
        events.push(event("prod", VolumeRole::Data, ResizeResult::Success, 0, now));
        events.push(event("prod", VolumeRole::Data, ResizeResult::Success, 0, now));
        events.push(event("prod", VolumeRole::Data, ResizeResult::Success, 0, now));
        assert_eq!(remaining_budget(&events, &id, 4, now), 0);
    }
}
