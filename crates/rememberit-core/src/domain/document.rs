//! Deck import/export document
//!
//! `{ "name": "...", "deck_id": 123, "cards": [{ "front", "back", "tags"?, "note_id"? }] }`
//!
//! External tooling produces and consumes this format. Card content is
//! stored verbatim.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::RememberItError;
use super::newtypes::{DeckId, NoteId};

/// One card entry of a [`DeckDocument`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDocument {
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
}

impl CardDocument {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            tags: None,
            note_id: None,
        }
    }

    /// Tags, empty when absent
    pub fn tags(&self) -> &str {
        self.tags.as_deref().unwrap_or("")
    }
}

/// A deck and its cards in the import format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<DeckId>,
    pub cards: Vec<CardDocument>,
}

impl DeckDocument {
    /// Parse a document from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, RememberItError> {
        serde_json::from_str(json).map_err(|e| {
            RememberItError::InvalidInput(format!("Deck JSON must contain a 'cards' array: {e}"))
        })
    }

    /// Load a document from a `.json` file
    pub fn load(path: &Path) -> Result<Self, RememberItError> {
        if !path.exists() {
            return Err(RememberItError::NotFound(format!(
                "deck file {}",
                path.display()
            )));
        }
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(RememberItError::InvalidInput(
                "Only JSON import is supported (provide a .json file)".to_string(),
            ));
        }
        let content = std::fs::read_to_string(path).map_err(|e| RememberItError::Store {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// Write the document as pretty-printed JSON and return the file written
    ///
    /// A directory `path` receives [`file_name`](Self::file_name).
    pub fn save_json(&self, path: &Path) -> Result<PathBuf, RememberItError> {
        let target = if path.is_dir() {
            path.join(self.file_name())
        } else {
            path.to_path_buf()
        };
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RememberItError::InvalidInput(e.to_string()))?;
        std::fs::write(&target, json).map_err(|e| RememberItError::Store {
            path: target.clone(),
            message: e.to_string(),
        })?;
        Ok(target)
    }

    /// `<name>.json` with path separators replaced by `_`
    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    /// Deck name usable as a file name, `deck` when blank
    pub fn file_stem(&self) -> String {
        let stem = self
            .name
            .trim()
            .replace("::", "_")
            .replace(['/', '\\'], "_");
        if stem.is_empty() {
            "deck".to_string()
        } else {
            stem
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let doc =
            DeckDocument::from_json_str(r#"{"name":"D","cards":[{"front":"Q","back":"A"}]}"#)
                .unwrap();
        assert_eq!(doc.name, "D");
        assert_eq!(doc.deck_id, None);
        assert_eq!(doc.cards, vec![CardDocument::new("Q", "A")]);
        assert_eq!(doc.cards[0].tags(), "");
    }

    #[test]
    fn test_parse_full_card() {
        let doc = DeckDocument::from_json_str(
            r#"{"name":"D","deck_id":5,"cards":[{"front":"Q","back":"A","tags":"t1 t2","note_id":99}]}"#,
        )
        .unwrap();
        assert_eq!(doc.deck_id, Some(DeckId::new(5)));
        assert_eq!(doc.cards[0].note_id, Some(NoteId::new(99)));
        assert_eq!(doc.cards[0].tags(), "t1 t2");
    }

    #[test]
    fn test_missing_cards_is_invalid_input() {
        let err = DeckDocument::from_json_str(r#"{"name":"D"}"#).unwrap_err();
        assert!(matches!(err, RememberItError::InvalidInput(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        let doc = DeckDocument {
            name: "Spanish".to_string(),
            deck_id: Some(DeckId::new(1)),
            cards: vec![CardDocument::new("hello", "hola")],
        };
        doc.save_json(&path).unwrap();
        let loaded = DeckDocument::load(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_save_into_directory_uses_deck_name() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DeckDocument {
            name: "Lang::Spanish".to_string(),
            deck_id: None,
            cards: Vec::new(),
        };
        let written = doc.save_json(dir.path()).unwrap();
        assert_eq!(written, dir.path().join("Lang_Spanish.json"));
        assert!(written.exists());
    }

    #[test]
    fn test_load_rejects_non_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.csv");
        std::fs::write(&path, "front,back").unwrap();
        assert!(matches!(
            DeckDocument::load(&path),
            Err(RememberItError::InvalidInput(_))
        ));
        assert!(matches!(
            DeckDocument::load(&dir.path().join("absent.json")),
            Err(RememberItError::NotFound(_))
        ));
    }
}
