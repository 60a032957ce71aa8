//! Fact Store - in-memory storage for Librarian-extracted facts.
//!
//! Facts are keyed by username and form a set per user, so adding the same
//! fact twice is a no-op. The store only grows; nothing is ever removed, which
//! is what lets readers run concurrently with the writer without coordination
//! beyond a short read lock.
//!
//! Ownership is split by type: the Librarian owns the [`FactStore`] (the only
//! way to write) and hands out cloneable [`FactReader`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Report returned when no user has any facts yet.
pub const NO_FACTS_REPORT: &str = "No facts available.";

type FactMap = BTreeMap<String, BTreeSet<String>>;

/// A single (username, fact) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactEntry {
    pub username: String,
    pub fact: String,
}

impl FactEntry {
    #[must_use]
    pub fn new(username: impl Into<String>, fact: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            fact: fact.into(),
        }
    }
}

/// Writable fact store. Not `Clone`: there is exactly one writer.
#[derive(Debug, Default)]
pub struct FactStore {
    facts: Arc<RwLock<FactMap>>,
}

/// Read-only view of a [`FactStore`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FactReader {
    facts: Arc<RwLock<FactMap>>,
}

impl FactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reader(&self) -> FactReader {
        FactReader {
            facts: Arc::clone(&self.facts),
        }
    }

    /// Insert a fact for a user. Returns `true` if it was not already present.
    ///
    /// Username and fact are trimmed; empty values are ignored.
    pub fn add(&mut self, username: &str, fact: &str) -> bool {
        let username = username.trim();
        let fact = fact.trim();
        if username.is_empty() || fact.is_empty() {
            return false;
        }

        let mut facts = self.facts.write().unwrap_or_else(PoisonError::into_inner);
        facts
            .entry(username.to_string())
            .or_default()
            .insert(fact.to_string())
    }

    /// Merge a batch of entries. Returns how many were new.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = FactEntry>) -> usize {
        entries
            .into_iter()
            .filter(|entry| self.add(&entry.username, &entry.fact))
            .count()
    }

    #[must_use]
    pub fn get_for_user(&self, username: &str) -> Vec<String> {
        self.reader().get_for_user(username)
    }

    #[must_use]
    pub fn get_all(&self) -> String {
        self.reader().get_all()
    }

    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.reader().fact_count()
    }
}

impl FactReader {
    fn read(&self) -> RwLockReadGuard<'_, FactMap> {
        self.facts.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Facts known about `username`, sorted. Empty for unknown users.
    #[must_use]
    pub fn get_for_user(&self, username: &str) -> Vec<String> {
        self.read()
            .get(username)
            .map(|facts| facts.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Human-readable report of every user's facts, users in sorted order.
    ///
    /// ```text
    /// Zonaxx:
    ///   - Loves space travel
    ///   - Owns a telescope
    /// ```
    #[must_use]
    pub fn get_all(&self) -> String {
        let facts = self.read();
        if facts.values().all(BTreeSet::is_empty) {
            return NO_FACTS_REPORT.to_string();
        }

        facts
            .iter()
            .filter(|(_, user_facts)| !user_facts.is_empty())
            .map(|(username, user_facts)| {
                let lines: Vec<String> = user_facts.iter().map(|f| format!("  - {f}")).collect();
                format!("{username}:\n{}", lines.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Usernames that have at least one fact.
    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.read().values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut store = FactStore::new();
        assert!(store.add("Zonaxx", "Loves space travel"));
        assert!(!store.add("Zonaxx", "Loves space travel"));
        assert!(!store.add("  Zonaxx ", " Loves space travel  "));

        assert_eq!(store.get_for_user("Zonaxx"), vec!["Loves space travel"]);
        assert_eq!(store.fact_count(), 1);
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut store = FactStore::new();
        assert!(!store.add("", "fact"));
        assert!(!store.add("user", "   "));
        assert_eq!(store.fact_count(), 0);
        assert_eq!(store.get_all(), NO_FACTS_REPORT);
    }

    #[test]
    fn unknown_user_has_no_facts() {
        let store = FactStore::new();
        assert!(store.get_for_user("nobody").is_empty());
    }

    #[test]
    fn facts_for_user_are_sorted() {
        let mut store = FactStore::new();
        store.add("alice", "plays violin");
        store.add("alice", "lives in Oslo");
        store.add("alice", "has two cats");

        assert_eq!(
            store.get_for_user("alice"),
            vec!["has two cats", "lives in Oslo", "plays violin"]
        );
    }

    #[test]
    fn report_lists_username_then_facts() {
        let mut store = FactStore::new();
        store.add("Zonaxx", "Loves space travel");

        assert_eq!(store.get_all(), "Zonaxx:\n  - Loves space travel");
    }

    #[test]
    fn report_covers_every_user() {
        let mut store = FactStore::new();
        store.add("bob", "likes chess");
        store.add("alice", "plays violin");
        store.add("alice", "has two cats");

        assert_eq!(
            store.get_all(),
            "alice:\n  - has two cats\n  - plays violin\n\nbob:\n  - likes chess"
        );
    }

    #[test]
    fn merge_counts_new_entries() {
        let mut store = FactStore::new();
        let added = store.merge([
            FactEntry::new("alice", "plays violin"),
            FactEntry::new("alice", "plays violin"),
            FactEntry::new("bob", "likes chess"),
        ]);
        assert_eq!(added, 2);
        assert_eq!(store.fact_count(), 2);
    }

    #[test]
    fn reader_sees_later_writes() {
        let mut store = FactStore::new();
        let reader = store.reader();
        assert!(reader.get_for_user("alice").is_empty());

        store.add("alice", "plays violin");

        assert_eq!(reader.get_for_user("alice"), vec!["plays violin"]);
        assert_eq!(reader.usernames(), vec!["alice"]);
    }

    #[test]
    fn reader_works_across_threads() {
        let mut store = FactStore::new();
        let reader = store.reader();

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                store.add("alice", &format!("fact {i}"));
            }
            store
        });
        // Readers may observe any prefix of the writes.
        let seen = reader.get_for_user("alice").len();
        assert!(seen <= 100);

        let store = handle.join().unwrap();
        assert_eq!(store.fact_count(), 100);
        assert_eq!(reader.fact_count(), 100);
    }
}
