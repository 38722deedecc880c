use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::SelectorArgs;

/// Lifecycle of one resolver run for a `(selector, args)` key.
///
/// An absent entry means resolution has not started. Transitions are
/// monotonic: a Finished entry is never regressed to Started for the same
/// key, only removed outright by an explicit invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Started,
    Finished,
}

/// Per-store resolution metadata, keyed by selector name and structurally
/// compared argument lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionState {
    entries: HashMap<String, Vec<(SelectorArgs, ResolutionStatus)>>,
}

impl ResolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that resolution has started for the key.
    /// Returns false if an entry already exists (Started or Finished).
    pub fn begin(&mut self, selector: &str, args: &SelectorArgs) -> bool {
        let slot = self.entries.entry(selector.to_string()).or_default();
        if slot.iter().any(|(a, _)| a == args) {
            return false;
        }
        slot.push((args.clone(), ResolutionStatus::Started));
        true
    }

    /// Mark resolution finished for the key.
    /// Returns true if the entry changed (inserted or promoted from Started).
    pub fn finish(&mut self, selector: &str, args: &SelectorArgs) -> bool {
        let slot = self.entries.entry(selector.to_string()).or_default();
        match slot.iter_mut().find(|(a, _)| a == args) {
            Some((_, status)) => {
                if *status == ResolutionStatus::Finished {
                    return false;
                }
                *status = ResolutionStatus::Finished;
                true
            }
            None => {
                slot.push((args.clone(), ResolutionStatus::Finished));
                true
            }
        }
    }

    /// Remove the entry for the key so the next selector call re-resolves.
    /// Returns true if an entry was removed.
    pub fn invalidate(&mut self, selector: &str, args: &SelectorArgs) -> bool {
        let Some(slot) = self.entries.get_mut(selector) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|(a, _)| a != args);
        let removed = slot.len() != before;
        if slot.is_empty() {
            self.entries.remove(selector);
        }
        removed
    }

    /// Remove every entry for the selector whose args match the predicate.
    /// Returns the number of entries removed.
    pub fn invalidate_matching(
        &mut self,
        selector: &str,
        predicate: impl Fn(&SelectorArgs) -> bool,
    ) -> usize {
        let Some(slot) = self.entries.get_mut(selector) else {
            return 0;
        };
        let before = slot.len();
        slot.retain(|(a, _)| !predicate(a));
        let removed = before - slot.len();
        if slot.is_empty() {
            self.entries.remove(selector);
        }
        removed
    }

    pub fn status(&self, selector: &str, args: &SelectorArgs) -> Option<ResolutionStatus> {
        self.entries
            .get(selector)?
            .iter()
            .find(|(a, _)| a == args)
            .map(|(_, status)| *status)
    }

    /// True once resolution has begun (Started or Finished).
    pub fn has_started(&self, selector: &str, args: &SelectorArgs) -> bool {
        self.status(selector, args).is_some()
    }

    pub fn has_finished(&self, selector: &str, args: &SelectorArgs) -> bool {
        self.status(selector, args) == Some(ResolutionStatus::Finished)
    }

    /// All tracked argument lists for a selector.
    pub fn args_for(&self, selector: &str) -> Vec<SelectorArgs> {
        self.entries
            .get(selector)
            .map(|slot| slot.iter().map(|(a, _)| a.clone()).collect())
            .unwrap_or_default()
    }
}

/// Transient guard against double-scheduling a resolver.
///
/// An entry exists from the moment a selector call decides to schedule a
/// resolver until the scheduled task has recorded Started in the
/// resolution state. It only dedups that window; the resolution state
/// covers everything after.
#[derive(Debug, Default)]
pub struct RunCache {
    in_flight: Mutex<HashMap<String, Vec<SelectorArgs>>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the key in-flight. Returns false if it already was.
    pub fn mark(&self, selector: &str, args: &SelectorArgs) -> bool {
        let mut map = self.in_flight.lock().unwrap();
        let slot = map.entry(selector.to_string()).or_default();
        if slot.iter().any(|a| a == args) {
            return false;
        }
        slot.push(args.clone());
        true
    }

    pub fn clear(&self, selector: &str, args: &SelectorArgs) {
        let mut map = self.in_flight.lock().unwrap();
        if let Some(slot) = map.get_mut(selector) {
            slot.retain(|a| a != args);
            if slot.is_empty() {
                map.remove(selector);
            }
        }
    }
}
