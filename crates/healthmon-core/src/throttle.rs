//! Per-rule firing state
//!
//! [`RuleInfo`] records are immutable once the index is built. The counters
//! that change on every raise live here instead, in an arena indexed in
//! parallel with the sorted rule list.

use crate::error::panic_message;
use crate::rule_index::RuleInfo;
use chrono::{DateTime, Utc};
use healthmon_types::WebEvent;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct LastFired {
    instant: Instant,
    time: DateTime<Utc>,
}

/// Raise count and last firing time of one rule
#[derive(Debug, Default)]
pub struct RuleThrottleState {
    times_raised: AtomicI64,
    last_fired: Mutex<Option<LastFired>>,
}

impl RuleThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many matching events have been seen, including ones that did not fire
    pub fn times_raised(&self) -> i64 {
        self.times_raised.load(Ordering::Acquire)
    }

    /// Wall-clock time the rule last fired
    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.lock().map(|last| last.time)
    }

    fn lock(&self) -> MutexGuard<'_, Option<LastFired>> {
        self.last_fired.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one more matching event and decide whether the rule fires now
    pub fn check_and_update(&self, rule: &RuleInfo, event: &WebEvent) -> bool {
        self.check_and_update_at(rule, event, Instant::now())
    }

    /// [`Self::check_and_update`] against an explicit clock reading
    pub fn check_and_update_at(&self, rule: &RuleInfo, event: &WebEvent, now: Instant) -> bool {
        let times_raised = self.times_raised.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(evaluator) = &rule.custom_evaluator {
            let verdict = panic::catch_unwind(AssertUnwindSafe(|| evaluator.can_fire(event, self)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("evaluator panicked: {}", panic_message(payload.as_ref())))
                });
            match verdict {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    warn!(
                        rule = %rule.name,
                        evaluator = rule.custom_evaluator_type.as_deref().unwrap_or_default(),
                        error = %err,
                        "Custom evaluator failed; rule will not fire"
                    );
                    return false;
                }
            }
        }

        if times_raised < i64::from(rule.min_instances) {
            return false;
        }
        if !rule.max_limit.is_infinite() && times_raised > rule.max_limit.0 {
            return false;
        }

        let fired = LastFired { instant: now, time: Utc::now() };

        if rule.min_interval.is_zero() {
            // Best effort; another thread holding the lock is recording a firing too
            if let Ok(mut last) = self.last_fired.try_lock() {
                *last = Some(fired);
            }
            return true;
        }

        let min_interval = rule.min_interval.to_duration();
        let mut last = self.lock();
        if let Some(previous) = *last {
            if now.saturating_duration_since(previous.instant) <= min_interval {
                return false;
            }
        }
        *last = Some(fired);
        true
    }
}

/// Throttle states indexed in parallel with the rule list
#[derive(Debug, Default)]
pub struct ThrottleArena {
    states: Box<[RuleThrottleState]>,
}

impl ThrottleArena {
    pub fn with_len(len: usize) -> Self {
        Self { states: (0..len).map(|_| RuleThrottleState::new()).collect() }
    }

    /// State of the rule at `index` in the sorted rule list
    pub fn get(&self, index: usize) -> Option<&RuleThrottleState> {
        self.states.get(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
