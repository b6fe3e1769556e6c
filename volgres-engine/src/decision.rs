//! Resize decision state machine.
//!
//! One evaluation per (instance, volume role) per reconciliation pass.
//! The gates run in a fixed order and short-circuit: the first failing
//! gate determines the outcome, so every terminal state carries a single
//! unambiguous reason.
//!
//! ```text
//! Disabled -> StatusStale -> NotTriggered -> Budget -> Ceiling
//!          -> WAL safety -> NoHeadroom -> Resize
//! ```

use volgres_models::{ResizePolicy, TriggerPolicy, VolumeDiskStatus, WalHealthInfo, WalSafetyPolicy};

use crate::clamp;

/// Everything one gate evaluation needs, assembled by the executor
#[derive(Debug)]
pub struct GateInput<'a> {
    pub policy: &'a ResizePolicy,
    /// None when the status probe failed or the status is older than the
    /// freshness window (unknown, not healthy)
    pub disk: Option<&'a VolumeDiskStatus>,
    /// None when WAL health was never collected for this instance
    pub wal: Option<&'a WalHealthInfo>,
    pub current_size: u64,
    pub remaining_budget: u32,
    /// True for the WAL volume, and for the data volume of a cluster
    /// with no separate WAL volume (the single-volume hazard case)
    pub wal_gate_applies: bool,
}

/// Why a triggered resize was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    RateLimit,
    ArchiveUnhealthy,
    PendingArchiveFiles { pending: u64, max: u64 },
    SlotRetention { retained_bytes: u64, max: u64 },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::RateLimit => f.write_str("rate_limit"),
            BlockReason::ArchiveUnhealthy => f.write_str("archive_unhealthy"),
            BlockReason::PendingArchiveFiles { pending, max } => {
                write!(f, "pending_archive_files ({} > {})", pending, max)
            }
            BlockReason::SlotRetention { retained_bytes, max } => {
                write!(
                    f,
                    "inactive_slot_retention ({} > {} bytes)",
                    retained_bytes, max
                )
            }
        }
    }
}

/// Terminal state of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Policy not enabled for this volume
    Disabled,
    /// Disk status missing or stale; nothing can be decided
    StatusStale,
    /// Neither trigger condition met
    NotTriggered,
    /// Triggered but refused; the reason is recorded
    Blocked(BlockReason),
    /// Current size already at the configured ceiling
    AtCeiling,
    /// Clamping against the ceiling left zero headroom
    NoHeadroom,
    /// Grow to `new_size`. `wal_unverified` marks a fail-open pass of
    /// the WAL safety gate so operators can tell it apart from a
    /// normally verified resize.
    Resize { new_size: u64, wal_unverified: bool },
}

/// Run the gate sequence. Pure: no I/O, fully deterministic.
pub fn evaluate(input: &GateInput<'_>) -> Outcome {
    let policy = input.policy;

    // Gate 1: Disabled
    if !policy.enabled {
        return Outcome::Disabled;
    }

    // Gate 1b: stale status is unknown, not healthy
    let disk = match input.disk {
        Some(disk) => disk,
        None => return Outcome::StatusStale,
    };

    // Gate 2: Trigger
    if !triggered(&policy.trigger, disk) {
        return Outcome::NotTriggered;
    }

    // Gate 3: Budget
    if input.remaining_budget == 0 {
        return Outcome::Blocked(BlockReason::RateLimit);
    }

    // Gate 4: Ceiling
    if let Some(limit) = policy.expansion.limit {
        if input.current_size >= limit {
            return Outcome::AtCeiling;
        }
    }

    // Gate 5: WAL safety
    let mut wal_unverified = false;
    if input.wal_gate_applies {
        let safety = policy
            .strategy
            .wal_safety
            .clone()
            .unwrap_or_default();
        match wal_safety_gate(&safety, input.wal) {
            WalGate::Blocked(reason) => return Outcome::Blocked(reason),
            WalGate::Unverified => wal_unverified = true,
            WalGate::Verified => {}
        }
    }

    // Gate 6: Resize
    let new_size = clamp::compute_new_size(
        input.current_size,
        &policy.expansion.step,
        policy.expansion.min_step,
        policy.expansion.max_step,
        policy.expansion.limit,
    );
    if new_size == input.current_size {
        return Outcome::NoHeadroom;
    }

    Outcome::Resize {
        new_size,
        wal_unverified,
    }
}

fn triggered(trigger: &TriggerPolicy, disk: &VolumeDiskStatus) -> bool {
    let by_usage = trigger
        .effective_usage_percent()
        .is_some_and(|threshold| disk.percent_used >= threshold as f64);
    let by_available = trigger
        .min_available
        .is_some_and(|floor| disk.available_bytes < floor);
    by_usage || by_available
}

/// Human-readable trigger description for the audit event
pub fn describe_trigger(trigger: &TriggerPolicy, disk: &VolumeDiskStatus) -> String {
    if let Some(threshold) = trigger.effective_usage_percent() {
        if disk.percent_used >= threshold as f64 {
            return format!("usage {:.1}% >= {}%", disk.percent_used, threshold);
        }
    }
    if let Some(floor) = trigger.min_available {
        if disk.available_bytes < floor {
            return format!("available {} < {} bytes", disk.available_bytes, floor);
        }
    }
    "triggered".to_string()
}

enum WalGate {
    Verified,
    Unverified,
    Blocked(BlockReason),
}

fn wal_safety_gate(safety: &WalSafetyPolicy, wal: Option<&WalHealthInfo>) -> WalGate {
    let wal = match wal {
        Some(wal) if !wal.is_entirely_unknown() => wal,
        // Entirely unknown health fails open, but visibly: the caller
        // tags the resulting event so the bypass is detectable.
        _ => return WalGate::Unverified,
    };

    let mut unverified = false;

    if safety.require_archive_healthy {
        match wal.archive_healthy {
            Some(false) => return WalGate::Blocked(BlockReason::ArchiveUnhealthy),
            None => unverified = true,
            Some(true) => {}
        }
    }

    if let Some(max) = safety.max_pending_archive_files {
        match wal.pending_archive_files {
            Some(pending) if pending > max => {
                return WalGate::Blocked(BlockReason::PendingArchiveFiles { pending, max });
            }
            None => unverified = true,
            Some(_) => {}
        }
    }

    if let Some(max) = safety.max_slot_retention_bytes {
        match wal.inactive_slot_retention() {
            Some(retained_bytes) if retained_bytes > max => {
                return WalGate::Blocked(BlockReason::SlotRetention { retained_bytes, max });
            }
            None => unverified = true,
            Some(_) => {}
        }
    }

    if unverified {
        WalGate::Unverified
    } else {
        WalGate::Verified
    }
}
