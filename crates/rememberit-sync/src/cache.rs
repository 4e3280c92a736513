//! In-memory deck cache
//!
//! Decks are keyed by [`Deck::cache_key`] (path, else name, else id) and
//! kept in the order of the sync that produced them. The order list and the
//! map always hold the same keys; every mutation goes through methods that
//! update both.

use std::collections::HashMap;

use rememberit_core::domain::{Deck, DeckCollection, DeckId};

/// How a caller names a deck
#[derive(Debug, Clone, Copy)]
pub enum DeckRef<'a> {
    /// A deck value obtained from an earlier listing
    Deck(&'a Deck),
    /// Path or name, falling back to a numeric id
    Key(&'a str),
    Id(DeckId),
}

impl DeckRef<'_> {
    /// Text used in not-found messages
    pub fn describe(&self) -> String {
        match self {
            DeckRef::Deck(deck) => deck.cache_key(),
            DeckRef::Key(key) => (*key).to_string(),
            DeckRef::Id(id) => id.to_string(),
        }
    }
}

impl<'a> From<&'a Deck> for DeckRef<'a> {
    fn from(deck: &'a Deck) -> Self {
        DeckRef::Deck(deck)
    }
}

impl<'a> From<&'a str> for DeckRef<'a> {
    fn from(key: &'a str) -> Self {
        DeckRef::Key(key)
    }
}

impl From<DeckId> for DeckRef<'_> {
    fn from(id: DeckId) -> Self {
        DeckRef::Id(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeckCache {
    order: Vec<String>,
    decks: HashMap<String, Deck>,
}

impl DeckCache {
    /// Cache holding `decks` in the given order
    ///
    /// A later deck with the same key replaces an earlier one in place.
    pub fn from_decks(decks: Vec<Deck>) -> Self {
        let mut cache = Self::default();
        for deck in decks {
            cache.upsert(deck);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in sync order
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deck> + '_ {
        self.order.iter().filter_map(|key| self.decks.get(key))
    }

    /// Snapshot of the cached decks in order
    pub fn to_collection(&self) -> DeckCollection {
        DeckCollection::new(self.iter().cloned().collect())
    }

    pub fn by_id(&self, id: DeckId) -> Option<&Deck> {
        self.iter().find(|deck| deck.id == id)
    }

    /// Resolve a [`DeckRef`]
    ///
    /// A deck value matches the cached deck with its id. A key matches a
    /// path exactly, then a name exactly, then a numeric id.
    pub fn resolve(&self, reference: &DeckRef<'_>) -> Option<&Deck> {
        match reference {
            DeckRef::Deck(deck) => self.by_id(deck.id),
            DeckRef::Id(id) => self.by_id(*id),
            DeckRef::Key(key) => self
                .iter()
                .find(|deck| deck.path == *key)
                .or_else(|| self.iter().find(|deck| deck.name == *key))
                .or_else(|| {
                    key.trim()
                        .parse::<DeckId>()
                        .ok()
                        .and_then(|id| self.by_id(id))
                }),
        }
    }

    /// Insert or replace a deck, keeping its position when it is already
    /// cached
    pub fn upsert(&mut self, deck: Deck) {
        if let Some(old_key) = self.key_of(deck.id) {
            self.remove_key(&old_key);
        }
        let key = deck.cache_key();
        if self.decks.insert(key.clone(), deck).is_none() {
            self.order.push(key);
        }
    }

    /// Drop the deck with `id`
    pub fn remove(&mut self, id: DeckId) -> Option<Deck> {
        let key = self.key_of(id)?;
        self.remove_key(&key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.decks.clear();
    }

    /// Whether the order list and the map hold exactly the same keys
    pub fn is_consistent(&self) -> bool {
        self.order.len() == self.decks.len()
            && self.order.iter().all(|key| self.decks.contains_key(key))
    }

    fn key_of(&self, id: DeckId) -> Option<String> {
        self.order
            .iter()
            .find(|key| self.decks.get(*key).is_some_and(|deck| deck.id == id))
            .cloned()
    }

    fn remove_key(&mut self, key: &str) -> Option<Deck> {
        let deck = self.decks.remove(key)?;
        self.order.retain(|k| k != key);
        Some(deck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck(id: i64, path: &str) -> Deck {
        Deck::new(DeckId::new(id), path)
    }

    fn sample() -> DeckCache {
        DeckCache::from_decks(vec![
            deck(1, "Default"),
            deck(10, "Spanish"),
            deck(11, "Spanish::Verbs"),
        ])
    }

    #[test]
    fn test_keeps_sync_order() {
        let cache = sample();
        assert_eq!(cache.keys(), ["Default", "Spanish", "Spanish::Verbs"]);
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_resolve_key_path_then_name_then_id() {
        let cache = sample();
        assert_eq!(cache.resolve(&DeckRef::Key("Spanish::Verbs")).unwrap().id, DeckId::new(11));
        assert_eq!(cache.resolve(&DeckRef::Key("Verbs")).unwrap().id, DeckId::new(11));
        assert_eq!(cache.resolve(&DeckRef::Key("10")).unwrap().path, "Spanish");
        assert!(cache.resolve(&DeckRef::Key("French")).is_none());
    }

    #[test]
    fn test_path_wins_over_name() {
        let cache = DeckCache::from_decks(vec![deck(5, "Lang::Spanish"), deck(6, "Spanish")]);
        assert_eq!(cache.resolve(&DeckRef::Key("Spanish")).unwrap().id, DeckId::new(6));
    }

    #[test]
    fn test_resolve_by_deck_value_uses_id() {
        let cache = sample();
        let stale = deck(10, "Old name");
        assert_eq!(cache.resolve(&DeckRef::Deck(&stale)).unwrap().path, "Spanish");
    }

    #[test]
    fn test_upsert_renamed_deck_replaces_key() {
        let mut cache = sample();
        cache.upsert(deck(10, "Castellano"));
        assert_eq!(cache.len(), 3);
        assert!(cache.resolve(&DeckRef::Key("Spanish")).is_none());
        assert_eq!(cache.resolve(&DeckRef::Key("Castellano")).unwrap().id, DeckId::new(10));
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_remove_keeps_consistency() {
        let mut cache = sample();
        let removed = cache.remove(DeckId::new(10)).unwrap();
        assert_eq!(removed.path, "Spanish");
        assert!(cache.remove(DeckId::new(10)).is_none());
        assert_eq!(cache.keys(), ["Default", "Spanish::Verbs"]);
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_duplicate_key_in_listing_replaced() {
        let cache = DeckCache::from_decks(vec![deck(1, "A"), deck(2, "A")]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resolve(&DeckRef::Key("A")).unwrap().id, DeckId::new(2));
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_to_collection_preserves_order() {
        let collection = sample().to_collection();
        let paths: Vec<&str> = collection.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["Default", "Spanish", "Spanish::Verbs"]);
    }
}
