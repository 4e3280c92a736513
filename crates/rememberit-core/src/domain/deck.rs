//! Decks, cards and the hierarchical deck tree
//!
//! Deck paths use `::` as the hierarchy separator. A deck's `id` survives a
//! rename while its `name` and `path` do not, so lookups accept any of the
//! three.

use serde::{Deserialize, Serialize};

use super::document::{CardDocument, DeckDocument};
use super::errors::DomainError;
use super::newtypes::{DeckId, NoteId};

/// Separator between the components of a deck path
pub const PATH_SEPARATOR: &str = "::";

/// Validate a user-supplied deck name or path.
///
/// Surrounding whitespace is trimmed from every component; empty components
/// (`"A::::B"`, `"::A"`) are rejected.
pub fn normalize_deck_path(name: &str) -> Result<String, DomainError> {
    let parts: Vec<&str> = name.split(PATH_SEPARATOR).map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(DomainError::InvalidDeckName(name.to_string()));
    }
    Ok(parts.join(PATH_SEPARATOR))
}

/// Last component of a deck path
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or(path)
}

/// Scheduling counts for a deck
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckCounts {
    pub new: u32,
    pub learn: u32,
    pub review: u32,
    /// Cards directly in this deck
    pub total: u32,
    /// Cards in this deck and all its descendants
    pub total_including_children: u32,
}

/// One flashcard as presented to callers
///
/// The public id is the note id; a two-field note produces exactly one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Option<NoteId>,
    pub front: String,
    pub back: String,
    /// Field text as stored, before splitting into front/back
    pub raw_text: String,
    /// Space-separated tags
    #[serde(default)]
    pub tags: String,
    pub edit_url: Option<String>,
    /// Owning deck (non-owning reference)
    pub deck_id: Option<DeckId>,
}

impl Card {
    /// Create a card from its two fields
    pub fn new(id: Option<NoteId>, front: impl Into<String>, back: impl Into<String>) -> Self {
        let front = front.into();
        let back = back.into();
        Self {
            raw_text: format!("{front} / {back}"),
            id,
            front,
            back,
            tags: String::new(),
            edit_url: None,
            deck_id: None,
        }
    }

    /// Attach the card to a deck
    #[must_use]
    pub fn in_deck(mut self, deck_id: DeckId) -> Self {
        self.deck_id = Some(deck_id);
        self
    }

    /// Build a card from a legacy search row whose text is `"front / back"`
    pub fn from_search_text(note_id: NoteId, text: &str, edit_base: &str) -> Self {
        let (front, back) = split_front_back(text);
        Self {
            id: Some(note_id),
            front,
            back,
            raw_text: text.to_string(),
            tags: String::new(),
            edit_url: Some(format!("{}/edit/{}", edit_base.trim_end_matches('/'), note_id)),
            deck_id: None,
        }
    }
}

/// Split search text on the first `" / "`; text without it is all front
pub fn split_front_back(text: &str) -> (String, String) {
    match text.split_once(" / ") {
        Some((front, back)) => (front.trim().to_string(), back.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

/// A deck with its cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    /// Full `::`-separated path
    pub path: String,
    pub level: u32,
    pub counts: DeckCounts,
    pub cards: Vec<Card>,
}

impl Deck {
    /// Create an empty deck from its full path
    pub fn new(id: DeckId, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id,
            name: leaf_name(&path).to_string(),
            level: path.split(PATH_SEPARATOR).count() as u32,
            path,
            counts: DeckCounts::default(),
            cards: Vec::new(),
        }
    }

    /// Key used by the deck cache: path, else name, else id
    pub fn cache_key(&self) -> String {
        if !self.path.is_empty() {
            self.path.clone()
        } else if !self.name.is_empty() {
            self.name.clone()
        } else {
            self.id.to_string()
        }
    }

    /// Look up a card by note id or by a case-insensitive substring of its front
    pub fn card(&self, key: &str) -> Option<&Card> {
        let key_lower = key.to_lowercase();
        self.cards.iter().find(|card| {
            card.id.is_some_and(|id| id.to_string() == key)
                || card.front.to_lowercase().contains(&key_lower)
        })
    }

    /// Export the deck in the import document format
    pub fn to_document(&self) -> DeckDocument {
        DeckDocument {
            name: self.path.clone(),
            deck_id: Some(self.id),
            cards: self
                .cards
                .iter()
                .map(|card| CardDocument {
                    front: card.front.clone(),
                    back: card.back.clone(),
                    tags: Some(card.tags.clone()),
                    note_id: card.id,
                })
                .collect(),
        }
    }
}

/// Ordered list of decks with key-based lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckCollection(Vec<Deck>);

impl DeckCollection {
    pub fn new(decks: Vec<Deck>) -> Self {
        Self(decks)
    }

    /// Find a deck by exact path, then by leaf name, then by id
    pub fn get(&self, key: &str) -> Option<&Deck> {
        self.0
            .iter()
            .find(|deck| deck.path == key)
            .or_else(|| self.0.iter().find(|deck| deck.name == key))
            .or_else(|| self.0.iter().find(|deck| deck.id.to_string() == key))
    }

    /// Find a deck by id
    pub fn by_id(&self, id: DeckId) -> Option<&Deck> {
        self.0.iter().find(|deck| deck.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Deck> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Deck> {
        self.0
    }

    /// Markdown table with one row per deck
    pub fn markdown(&self) -> String {
        let mut lines = vec![
            "|id|path|new|learn|review|total|total_incl_children|".to_string(),
            "|---|---|---|---|---|---|---|".to_string(),
        ];
        for deck in &self.0 {
            let c = &deck.counts;
            lines.push(format!(
                "|{}|{}|{}|{}|{}|{}|{}|",
                deck.id, deck.path, c.new, c.learn, c.review, c.total, c.total_including_children
            ));
        }
        lines.join("\n")
    }
}

impl IntoIterator for DeckCollection {
    type Item = Deck;
    type IntoIter = std::vec::IntoIter<Deck>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeckCollection {
    type Item = &'a Deck;
    type IntoIter = std::slice::Iter<'a, Deck>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Deck>> for DeckCollection {
    fn from(decks: Vec<Deck>) -> Self {
        Self(decks)
    }
}

/// Node of the server's deck tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckNode {
    pub deck_id: i64,
    pub name: String,
    pub children: Vec<DeckNode>,
    pub level: u32,
    pub collapsed: bool,
    pub review_count: u32,
    pub learn_count: u32,
    pub new_count: u32,
    pub intraday_learning: u32,
    pub interday_learning_uncapped: u32,
    pub new_uncapped: u32,
    pub review_uncapped: u32,
    pub total_in_deck: u32,
    pub total_including_children: u32,
    pub filtered: bool,
}

impl DeckNode {
    /// Depth-first walk producing one deck per node.
    ///
    /// The root's path is its own name; a child's path is
    /// `parent.path + "::" + child.name`, or just the child's name when the
    /// parent path is empty (the server's unnamed root).
    pub fn flatten(&self) -> Vec<Deck> {
        let mut out = Vec::new();
        self.flatten_into(None, &mut out);
        out
    }

    fn flatten_into(&self, parent_path: Option<&str>, out: &mut Vec<Deck>) {
        let path = match parent_path {
            Some(parent) if !parent.is_empty() => {
                format!("{parent}{PATH_SEPARATOR}{}", self.name)
            }
            _ => self.name.clone(),
        };
        out.push(Deck {
            id: DeckId::new(self.deck_id),
            name: self.name.clone(),
            path: path.clone(),
            level: self.level,
            counts: DeckCounts {
                new: self.new_count,
                learn: self.learn_count,
                review: self.review_count,
                total: self.total_in_deck,
                total_including_children: self.total_including_children,
            },
            cards: Vec::new(),
        });
        for child in &self.children {
            child.flatten_into(Some(&path), out);
        }
    }

    /// Number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DeckNode::node_count).sum::<usize>()
    }
}
