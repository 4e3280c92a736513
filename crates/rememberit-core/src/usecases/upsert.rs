//! Bulk upsert planning
//!
//! Decides, for each incoming card, whether to insert a new note, update an
//! existing one, or leave the deck alone. Planning is pure: the orchestrator
//! applies the resulting actions in a single collection round trip.
//!
//! Checks run in this order for each incoming card:
//!
//! 1. A repeat of an earlier `(front, back)` in the same batch is dropped.
//! 2. An explicit `note_id` that exists is updated when its content differs
//!    or `replace` is set, and skipped otherwise.
//! 3. A `(front, back)` pair already in the deck is skipped.
//! 4. A front already in the deck with a different back updates that note.
//! 5. Anything else is inserted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::deck::Card;
use crate::domain::document::CardDocument;
use crate::domain::newtypes::NoteId;

/// What to do with one incoming card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    Insert {
        front: String,
        back: String,
        tags: String,
    },
    Update {
        note_id: NoteId,
        front: String,
        back: String,
        tags: String,
    },
    /// Content already present
    Skip { front: String, back: String },
    /// Repeat of an earlier entry in the same batch
    Duplicate { front: String, back: String },
}

impl UpsertAction {
    /// Whether applying this action changes the collection
    pub fn is_mutation(&self) -> bool {
        matches!(self, UpsertAction::Insert { .. } | UpsertAction::Update { .. })
    }
}

/// Counts of what an upsert did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

impl UpsertReport {
    /// Tally a list of planned actions
    pub fn from_actions(actions: &[UpsertAction]) -> Self {
        let mut report = Self::default();
        for action in actions {
            match action {
                UpsertAction::Insert { .. } => report.inserted += 1,
                UpsertAction::Update { .. } => report.updated += 1,
                UpsertAction::Skip { .. } => report.skipped += 1,
                UpsertAction::Duplicate { .. } => report.duplicates += 1,
            }
        }
        report
    }

    /// Whether nothing needs to be written
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

impl std::fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} unchanged, {} duplicate",
            self.inserted, self.updated, self.skipped, self.duplicates
        )
    }
}

/// Plan the actions needed to bring `existing` in line with `incoming`
pub fn plan_upsert(
    existing: &[Card],
    incoming: &[CardDocument],
    replace: bool,
) -> Vec<UpsertAction> {
    let mut by_id: HashMap<NoteId, &Card> = HashMap::new();
    let mut by_front_back: HashSet<(&str, &str)> = HashSet::new();
    let mut by_front: HashMap<&str, NoteId> = HashMap::new();
    for card in existing {
        if let Some(id) = card.id {
            by_id.entry(id).or_insert(card);
            by_front.entry(card.front.as_str()).or_insert(id);
        }
        by_front_back.insert((card.front.as_str(), card.back.as_str()));
    }

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut actions = Vec::with_capacity(incoming.len());

    for card in incoming {
        let front = card.front.as_str();
        let back = card.back.as_str();
        let tags = card.tags().to_string();

        if !seen.insert((front, back)) {
            actions.push(UpsertAction::Duplicate {
                front: front.to_string(),
                back: back.to_string(),
            });
            continue;
        }

        if let Some((note_id, existing)) = card
            .note_id
            .and_then(|id| by_id.get(&id).map(|found| (id, *found)))
        {
            let differs = existing.front != front || existing.back != back;
            if replace || differs {
                actions.push(UpsertAction::Update {
                    note_id,
                    front: front.to_string(),
                    back: back.to_string(),
                    tags,
                });
            } else {
                actions.push(UpsertAction::Skip {
                    front: front.to_string(),
                    back: back.to_string(),
                });
            }
            continue;
        }

        if by_front_back.contains(&(front, back)) {
            actions.push(UpsertAction::Skip {
                front: front.to_string(),
                back: back.to_string(),
            });
            continue;
        }

        if let Some(&note_id) = by_front.get(front) {
            actions.push(UpsertAction::Update {
                note_id,
                front: front.to_string(),
                back: back.to_string(),
                tags,
            });
            continue;
        }

        actions.push(UpsertAction::Insert {
            front: front.to_string(),
            back: back.to_string(),
            tags,
        });
    }

    actions
}
