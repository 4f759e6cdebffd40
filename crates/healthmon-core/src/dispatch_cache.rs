//! Memoized rule matching per event signature
//!
//! The first raise of a given `(event type, event code)` pair walks the rule
//! list; the result is kept for the lifetime of the cache. System and custom
//! codes are cached separately: the system signature space is small and
//! saturates quickly, custom codes are sparse.

use crate::provider::EventProvider;
use crate::rule_index::{RuleIndex, RuleInfo};
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use healthmon_types::EventTypeId;
use healthmon_types::codes::is_system_code;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSignature {
    pub event_type: EventTypeId,
    pub event_code: i32,
}

/// One matched rule
#[derive(Debug, Clone)]
pub struct FiringRuleInfo {
    pub rule: Arc<RuleInfo>,
    /// Position, within the same result, of the first rule dispatching to
    /// the same provider. `None` when no other matched rule shares it.
    pub index_of_first_rule_with_same_provider: Option<usize>,
}

impl FiringRuleInfo {
    pub fn rule_name(&self) -> &str {
        &self.rule.name
    }

    pub fn provider(&self) -> Option<&Arc<dyn EventProvider>> {
        self.rule.provider.as_ref()
    }

    pub fn provider_group_leader(&self) -> Option<usize> {
        self.index_of_first_rule_with_same_provider
    }
}

impl PartialEq for FiringRuleInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rule, &other.rule)
            && self.index_of_first_rule_with_same_provider == other.index_of_first_rule_with_same_provider
    }
}

/// Matched rules, most specific first
pub type FiringRules = Arc<[FiringRuleInfo]>;

/// Snapshot of cache counters
#[derive(Debug, Clone, Serialize)]
pub struct DispatchCacheStats {
    pub system_entries: usize,
    pub custom_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
}

/// Signature → matched rules, populated on demand
pub struct EventDispatchCache {
    index: Arc<RuleIndex>,
    system: DashMap<EventSignature, FiringRules, RandomState>,
    custom: DashMap<EventSignature, FiringRules, RandomState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EventDispatchCache {
    pub fn new(index: Arc<RuleIndex>) -> Self {
        Self {
            index,
            system: DashMap::with_hasher(RandomState::new()),
            custom: DashMap::with_hasher(RandomState::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> &Arc<RuleIndex> {
        &self.index
    }

    /// Rules an event of `event_type` with `event_code` fires, most
    /// specific first. An empty result means the event is not dispatched.
    pub fn find_firing_rules(&self, event_type: EventTypeId, event_code: i32) -> FiringRules {
        let signature = EventSignature { event_type, event_code };
        let cache = if is_system_code(event_code) { &self.system } else { &self.custom };

        if let Some(found) = cache.get(&signature) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(found.value());
        }

        // The entry guard holds the shard lock, so each signature is computed once
        match cache.entry(signature) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let rules = self.compute(signature);
                debug!(
                    event_type = %signature.event_type,
                    event_code = signature.event_code,
                    matched = rules.len(),
                    "Dispatch cache populated"
                );
                Arc::clone(entry.insert(rules).value())
            }
        }
    }

    fn compute(&self, signature: EventSignature) -> FiringRules {
        let taxonomy = self.index.taxonomy();
        let mut matched: Vec<FiringRuleInfo> = self
            .index
            .rules()
            .iter()
            .rev()
            .filter(|rule| rule.matches(taxonomy, signature.event_type, signature.event_code))
            .map(|rule| FiringRuleInfo {
                rule: Arc::clone(rule),
                index_of_first_rule_with_same_provider: None,
            })
            .collect();

        link_shared_providers(&mut matched);
        Arc::from(matched)
    }

    pub fn stats(&self) -> DispatchCacheStats {
        let cache_hits = self.hits.load(Ordering::Relaxed);
        let cache_misses = self.misses.load(Ordering::Relaxed);
        let total = cache_hits + cache_misses;
        DispatchCacheStats {
            system_entries: self.system.len(),
            custom_entries: self.custom.len(),
            cache_hits,
            cache_misses,
            hit_rate: if total > 0 { cache_hits as f64 / total as f64 } else { 0.0 },
        }
    }

    /// Number of cached signatures
    pub fn len(&self) -> usize {
        self.system.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point every rule sharing a provider at the earliest such rule, the
/// earliest included
fn link_shared_providers(matched: &mut [FiringRuleInfo]) {
    for i in 0..matched.len() {
        if matched[i].index_of_first_rule_with_same_provider.is_some() {
            continue;
        }
        for j in (i + 1)..matched.len() {
            if matched[j].index_of_first_rule_with_same_provider.is_none()
                && matched[i].rule.shares_provider_with(&matched[j].rule)
            {
                matched[i].index_of_first_rule_with_same_provider = Some(i);
                matched[j].index_of_first_rule_with_same_provider = Some(i);
            }
        }
    }
}
