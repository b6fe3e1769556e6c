//! Expansion clamp calculator: turns a trigger into a bounded size delta.

use volgres_models::quantity::ResizeStep;

/// Compute the size a volume should grow to.
///
/// A percentage step's raw delta is clamped into `[min_step, max_step]`:
/// the floor keeps a rate-limited action from being wasted on a trivial
/// increase on small volumes, the ceiling keeps one action from
/// requesting a disproportionate expansion on very large ones. An
/// absolute step is already fixed, so the bounds do not apply to it.
///
/// The result is always within `[current, limit]`; in particular a limit
/// below the current size yields `current` (a no-op), never a shrink.
pub fn compute_new_size(
    current: u64,
    step: &ResizeStep,
    min_step: Option<u64>,
    max_step: Option<u64>,
    limit: Option<u64>,
) -> u64 {
    let delta = match step {
        ResizeStep::Percent(pct) => {
            let mut delta = (current as f64 * pct / 100.0).round() as u64;
            if let Some(floor) = min_step {
                delta = delta.max(floor);
            }
            if let Some(ceiling) = max_step {
                delta = delta.min(ceiling);
            }
            delta
        }
        ResizeStep::Absolute(bytes) => *bytes,
    };

    let grown = current.saturating_add(delta);
    match limit {
        Some(limit) => grown.min(limit).max(current),
        None => grown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volgres_models::quantity::{GIB, MIB, TIB};

    #[test]
    fn test_small_volume_clamped_up_to_min_step() {
        // 2Gi at 20% gives a raw delta of 410Mi; the 1Gi floor wins
        let new = compute_new_size(
            2 * GIB,
            &ResizeStep::Percent(20.0),
            Some(GIB),
            Some(500 * GIB),
            None,
        );
        assert_eq!(new, 3 * GIB);
    }

    #[test]
    fn test_large_volume_clamped_down_to_max_step() {
        // 10Ti at 20% gives a raw delta of 2Ti; the 500Gi ceiling wins
        let new = compute_new_size(
            10 * TIB,
            &ResizeStep::Percent(20.0),
            Some(GIB),
            Some(500 * GIB),
            None,
        );
        assert_eq!(new, 10 * TIB + 500 * GIB);
    }

    #[test]
    fn test_percent_within_bounds_used_as_is() {
        // 100Gi at 20% = 20Gi, inside [1Gi, 500Gi]
        let new = compute_new_size(
            100 * GIB,
            &ResizeStep::Percent(20.0),
            Some(GIB),
            Some(500 * GIB),
            None,
        );
        assert_eq!(new, 120 * GIB);
    }

    #[test]
    fn test_absolute_step_ignores_bounds() {
        // 10Gi absolute step with a 500Gi floor: the floor must not apply
        let new = compute_new_size(
            100 * GIB,
            &ResizeStep::Absolute(10 * GIB),
            Some(500 * GIB),
            Some(MIB),
            None,
        );
        assert_eq!(new, 110 * GIB);
    }

    #[test]
    fn test_limit_caps_growth() {
        let new = compute_new_size(
            90 * GIB,
            &ResizeStep::Percent(20.0),
            None,
            None,
            Some(100 * GIB),
        );
        assert_eq!(new, 100 * GIB);
    }

    #[test]
    fn test_at_limit_is_idempotent() {
        let new = compute_new_size(
            100 * GIB,
            &ResizeStep::Percent(20.0),
            Some(GIB),
            None,
            Some(100 * GIB),
        );
        assert_eq!(new, 100 * GIB);
    }

    #[test]
    fn test_limit_below_current_never_shrinks() {
        let new = compute_new_size(
            100 * GIB,
            &ResizeStep::Percent(20.0),
            None,
            None,
            Some(50 * GIB),
        );
        assert_eq!(new, 100 * GIB);
    }

    #[test]
    fn test_saturating_near_u64_max() {
        let new = compute_new_size(u64::MAX - 10, &ResizeStep::Absolute(GIB), None, None, None);
        assert_eq!(new, u64::MAX);
    }

    #[test]
    fn test_monotonicity_across_magnitudes() {
        // current <= new <= limit across megabytes to petabytes
        let sizes = [MIB, 64 * MIB, GIB, 100 * GIB, TIB, 10 * TIB, 1024 * TIB];
        for &current in &sizes {
            for step in [
                ResizeStep::Percent(5.0),
                ResizeStep::Percent(50.0),
                ResizeStep::Absolute(GIB),
            ] {
                let limit = current * 2;
                let new = compute_new_size(current, &step, Some(MIB), Some(TIB), Some(limit));
                assert!(new >= current, "shrunk at {}", current);
                assert!(new <= limit, "exceeded limit at {}", current);
            }
        }
    }
}
