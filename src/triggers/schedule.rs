//! Per-entity runtime state for compiled rules

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::Seconds;
use crate::triggers::compiler::CompiledRule;
use crate::triggers::pattern::TriggerPattern;

/// Drift-free periodic schedule
///
/// The n-th firing is due at `anchor + interval * n`, so accumulated
/// floating-point error never shifts later firings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSchedule {
    pub anchor: Seconds,
    pub interval: f64,
    pub fired: u64,
}

impl PeriodicSchedule {
    pub fn new(anchor: Seconds, interval: f64) -> Self {
        Self {
            anchor,
            interval,
            fired: 0,
        }
    }

    pub fn next_fire(&self) -> Seconds {
        self.anchor + self.interval * (self.fired + 1) as f64
    }

    /// Scheduled times now due, oldest first, capped at `max_catch_up`
    ///
    /// Firings past the cap are skipped rather than queued; `skipped` says
    /// how many.
    pub fn take_due(&mut self, now: Seconds, max_catch_up: u64) -> CatchUp {
        let mut catch_up = CatchUp::default();
        while now >= self.next_fire() {
            if (catch_up.due.len() as u64) < max_catch_up {
                catch_up.due.push(self.next_fire());
                self.fired += 1;
            } else {
                // Jump to the last interval boundary at or before now
                let elapsed = ((now - self.anchor) / self.interval).floor();
                if elapsed.is_finite() && elapsed >= 0.0 {
                    let boundary = elapsed as u64;
                    catch_up.skipped = boundary.saturating_sub(self.fired);
                    self.fired = self.fired.max(boundary);
                }
                break;
            }
        }
        catch_up
    }
}

/// Result of one `take_due` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatchUp {
    pub due: Vec<Seconds>,
    pub skipped: u64,
}

/// A compiled rule bound to one entity
#[derive(Debug, Clone)]
pub struct TriggerRuntime {
    pub rule: Arc<CompiledRule>,
    pub schedule: Option<PeriodicSchedule>,
}

impl TriggerRuntime {
    pub fn new(rule: CompiledRule, now: Seconds) -> Self {
        let schedule = match rule.pattern {
            TriggerPattern::Periodic { interval } => Some(PeriodicSchedule::new(now, interval)),
            _ => None,
        };
        Self {
            rule: Arc::new(rule),
            schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_up_fires_every_missed_interval() {
        let mut schedule = PeriodicSchedule::new(0.0, 1.0);
        assert!(schedule.take_due(0.5, 100).due.is_empty());
        assert_eq!(schedule.take_due(3.5, 100).due, vec![1.0, 2.0, 3.0]);
        assert_eq!(schedule.next_fire(), 4.0);
        assert_eq!(schedule.take_due(4.0, 100).due, vec![4.0]);
    }

    #[test]
    fn test_no_drift_over_many_small_steps() {
        let mut schedule = PeriodicSchedule::new(0.0, 0.1);
        let mut now = 0.0;
        let mut total = 0;
        for _ in 0..1000 {
            now += 0.01;
            total += schedule.take_due(now, 100).due.len();
        }
        // 1000 * 0.01 accumulates to just under or over 10.0
        assert!((99..=100).contains(&total));
        assert_eq!(schedule.fired as usize, total);
    }

    #[test]
    fn test_catch_up_cap_skips_the_rest() {
        let mut schedule = PeriodicSchedule::new(0.0, 1.0);
        let catch_up = schedule.take_due(1000.5, 10);
        assert_eq!(catch_up.due.len(), 10);
        assert_eq!(catch_up.skipped, 990);
        assert_eq!(schedule.next_fire(), 1001.0);
    }
}
