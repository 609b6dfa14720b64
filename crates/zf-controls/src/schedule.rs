//! Wall-clock aligned PWM cycles.
//!
//! Cycle starts are aligned to multiples of the cycle length since the Unix
//! epoch rather than to controller start-up, so zones that restart
//! independently stay in phase. Zones sharing one heat source are spread
//! over the cycle by a per-zone phase offset of `i * cycle / N` seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shortest cycle the scheduler will align to, in seconds.
pub const MIN_CYCLE_SECONDS: i64 = 60;

fn cycle_seconds(cycle_minutes: u32) -> i64 {
    (i64::from(cycle_minutes) * 60).max(MIN_CYCLE_SECONDS)
}

/// Phase offset of zone `index` among `count` zones, in whole seconds.
pub fn phase_offset_seconds(cycle_minutes: u32, index: usize, count: usize) -> i64 {
    if count <= 1 {
        return 0;
    }
    let cycle = cycle_seconds(cycle_minutes);
    (index as i64 * cycle) / count as i64
}

/// Start of the cycle `now` falls in, for zone `index` of `count`.
///
/// The result is always `<= now`.
pub fn aligned_cycle_start(
    now: DateTime<Utc>,
    cycle_minutes: u32,
    index: usize,
    count: usize,
) -> DateTime<Utc> {
    let cycle = cycle_seconds(cycle_minutes);
    let timestamp = now.timestamp();
    let mut aligned = timestamp - timestamp.rem_euclid(cycle);

    aligned += phase_offset_seconds(cycle_minutes, index, count);
    if aligned > timestamp {
        aligned -= cycle;
    }

    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(now)
}

/// Tracks which cycle a zone is in.
///
/// A new cycle is detected when the aligned start moves; that is the only
/// moment a PWM zone recomputes its duty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleClock {
    pub cycle_minutes: u32,
    /// Position of this zone in the shared PWM pool.
    pub index: usize,
    /// Size of the shared PWM pool.
    pub count: usize,
}

impl CycleClock {
    pub fn new(cycle_minutes: u32, index: usize, count: usize) -> Self {
        Self {
            cycle_minutes,
            index,
            count,
        }
    }

    pub fn cycle_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        aligned_cycle_start(now, self.cycle_minutes, self.index, self.count)
    }

    /// Returns the current cycle start when it differs from `previous`.
    pub fn should_start_cycle(
        &self,
        now: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let start = self.cycle_start(now);
        match previous {
            Some(prev) if prev == start => None,
            _ => Some(start),
        }
    }

    pub fn offset_seconds(&self) -> i64 {
        phase_offset_seconds(self.cycle_minutes, self.index, self.count)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn start_never_after_now(
            secs in 0_i64..4_000_000_000,
            cycle in 1_u32..120,
            count in 1_usize..12,
            idx_seed in 0_usize..1000,
        ) {
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let index = idx_seed % count;
            let start = aligned_cycle_start(now, cycle, index, count);
            prop_assert!(start <= now);
            prop_assert!(now - start < chrono::Duration::minutes(i64::from(cycle.max(1))));
        }

        /// Offsets of N zones are evenly spaced and cover one cycle exactly once.
        #[test]
        fn offsets_evenly_spaced(cycle in 1_u32..120, count in 2_usize..20) {
            let cycle_s = i64::from(cycle) * 60;
            let offsets: Vec<i64> = (0..count)
                .map(|i| phase_offset_seconds(cycle, i, count))
                .collect();
            prop_assert_eq!(offsets[0], 0);
            let ideal = cycle_s as f64 / count as f64;
            for pair in offsets.windows(2) {
                let gap = (pair[1] - pair[0]) as f64;
                prop_assert!((gap - ideal).abs() <= 1.0);
            }
            let wrap = (cycle_s + offsets[0] - offsets[count - 1]) as f64;
            prop_assert!((wrap - ideal).abs() <= 1.0);
            prop_assert!(offsets.iter().all(|&o| (0..cycle_s).contains(&o)));
        }
    }
}
