//! Subscription Set: broker symbols the data channel should be streaming.
//!
//! The set outlives individual sessions. A reconnect replays it in full, so
//! it is the single source of truth for what is subscribed.

use std::collections::BTreeSet;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SubscriptionSet {
    inner: Mutex<BTreeSet<String>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert symbols; returns the ones that were not already present.
    pub fn add(&self, symbols: &[String]) -> Vec<String> {
        let mut set = self.inner.lock();
        symbols
            .iter()
            .filter(|s| set.insert((*s).clone()))
            .cloned()
            .collect()
    }

    /// Remove symbols; returns the ones that were present.
    pub fn remove(&self, symbols: &[String]) -> Vec<String> {
        let mut set = self.inner.lock();
        symbols.iter().filter(|s| set.remove(*s)).cloned().collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.inner.lock().contains(symbol)
    }

    /// Sorted copy of the current set.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_reports_only_new_symbols() {
        let set = SubscriptionSet::new();
        assert_eq!(set.add(&syms(&["B", "A"])), syms(&["B", "A"]));
        assert_eq!(set.add(&syms(&["A", "C", "C"])), syms(&["C"]));
        assert_eq!(set.snapshot(), syms(&["A", "B", "C"]));
    }

    #[test]
    fn remove_reports_only_present_symbols() {
        let set = SubscriptionSet::new();
        set.add(&syms(&["A", "B"]));
        assert_eq!(set.remove(&syms(&["B", "Z"])), syms(&["B"]));
        assert!(set.contains("A"));
        assert!(!set.contains("B"));
        assert_eq!(set.len(), 1);
        set.remove(&syms(&["A"]));
        assert!(set.is_empty());
    }
}
