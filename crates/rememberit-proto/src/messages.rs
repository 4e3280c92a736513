//! AnkiWeb binary messages.
//!
//! The server publishes no schema; field numbers below were reconstructed
//! from observed traffic. Scalars follow proto3 rules: zero values are not
//! written, and a field missing on the wire decodes to its zero value.
//! Unknown fields are skipped.

use rememberit_core::domain::DeckNode;

use crate::error::{ProtoError, ProtoResult};
use crate::wire::{WireReader, WireWriter};

/// Deepest deck tree accepted by the decoder.
const MAX_DECK_DEPTH: usize = 64;

/// A message with a fixed wire layout.
pub trait Message: Sized {
    /// Encode to wire bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decode from wire bytes.
    fn decode(bytes: &[u8]) -> ProtoResult<Self>;
}

// ============================================================================
// Deck tree
// ============================================================================

fn write_deck_node(node: &DeckNode) -> WireWriter {
    let mut w = WireWriter::new();
    if node.deck_id != 0 {
        w.int64(1, node.deck_id);
    }
    if !node.name.is_empty() {
        w.string(2, &node.name);
    }
    for child in &node.children {
        w.message(3, &write_deck_node(child));
    }
    if node.level != 0 {
        w.uint64(4, u64::from(node.level));
    }
    if node.collapsed {
        w.bool(5, true);
    }
    let counters = [
        (6, node.review_count),
        (7, node.learn_count),
        (8, node.new_count),
        (9, node.intraday_learning),
        (10, node.interday_learning_uncapped),
        (11, node.new_uncapped),
        (12, node.review_uncapped),
        (13, node.total_in_deck),
        (14, node.total_including_children),
    ];
    for (field, value) in counters {
        if value != 0 {
            w.uint64(field, u64::from(value));
        }
    }
    if node.filtered {
        w.bool(16, true);
    }
    w
}

fn read_deck_node(bytes: &[u8], depth: usize) -> ProtoResult<DeckNode> {
    if depth > MAX_DECK_DEPTH {
        return Err(ProtoError::NestingTooDeep {
            max: MAX_DECK_DEPTH,
        });
    }
    let mut node = DeckNode::default();
    let mut reader = WireReader::new(bytes);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => node.deck_id = value.as_i64(field)?,
            2 => node.name = value.as_str(field)?.to_string(),
            3 => node
                .children
                .push(read_deck_node(value.as_bytes(field)?, depth + 1)?),
            4 => node.level = value.as_u32(field)?,
            5 => node.collapsed = value.as_bool(field)?,
            6 => node.review_count = value.as_u32(field)?,
            7 => node.learn_count = value.as_u32(field)?,
            8 => node.new_count = value.as_u32(field)?,
            9 => node.intraday_learning = value.as_u32(field)?,
            10 => node.interday_learning_uncapped = value.as_u32(field)?,
            11 => node.new_uncapped = value.as_u32(field)?,
            12 => node.review_uncapped = value.as_u32(field)?,
            13 => node.total_in_deck = value.as_u32(field)?,
            14 => node.total_including_children = value.as_u32(field)?,
            16 => node.filtered = value.as_bool(field)?,
            _ => {}
        }
    }
    Ok(node)
}

impl Message for DeckNode {
    fn encode(&self) -> Vec<u8> {
        write_deck_node(self).into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        read_deck_node(bytes, 0)
    }
}

/// `/svc/decks/deck-list-info` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckListInfoRequest {
    pub minutes_west_of_utc: Option<i32>,
}

impl Message for DeckListInfoRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if let Some(minutes) = self.minutes_west_of_utc.filter(|m| *m != 0) {
            w.int32(1, minutes);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                msg.minutes_west_of_utc = Some(value.as_i32(field)?);
            }
        }
        Ok(msg)
    }
}

/// `/svc/decks/deck-list-info` response.
///
/// The scalars are `None` when absent from the wire and `Some(0)` when the
/// server sent an explicit zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckListInfoResponse {
    pub top_node: Option<DeckNode>,
    pub current_deck_id: Option<i64>,
    pub collection_size_bytes: Option<u64>,
    pub media_size_bytes: Option<u64>,
}

impl Message for DeckListInfoResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if let Some(top) = &self.top_node {
            w.message(1, &write_deck_node(top));
        }
        if let Some(id) = self.current_deck_id {
            w.int64(2, id);
        }
        if let Some(size) = self.collection_size_bytes {
            w.uint64(3, size);
        }
        if let Some(size) = self.media_size_bytes {
            w.uint64(4, size);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => msg.top_node = Some(read_deck_node(value.as_bytes(field)?, 0)?),
                2 => msg.current_deck_id = Some(value.as_i64(field)?),
                3 => msg.collection_size_bytes = Some(value.as_u64(field)?),
                4 => msg.media_size_bytes = Some(value.as_u64(field)?),
                _ => {}
            }
        }
        Ok(msg)
    }
}

// ============================================================================
// Editor
// ============================================================================

/// Note type and target deck for a new note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    pub note_type_id: Option<i64>,
    pub deck_id: Option<i64>,
}

/// `/svc/editor/add-or-update` request.
///
/// `existing_note_id` present means update; absent means create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOrUpdateRequest {
    pub fields: Vec<String>,
    pub tags: String,
    pub model: Option<ModelSelection>,
    pub existing_note_id: Option<i64>,
}

impl AddOrUpdateRequest {
    /// Request creating a note in `deck_id`.
    pub fn create(front: &str, back: &str, tags: &str, note_type_id: i64, deck_id: i64) -> Self {
        Self {
            fields: vec![front.to_string(), back.to_string()],
            tags: tags.to_string(),
            model: Some(ModelSelection {
                note_type_id: Some(note_type_id),
                deck_id: Some(deck_id),
            }),
            existing_note_id: None,
        }
    }

    /// Request overwriting the fields of `note_id`.
    pub fn update(front: &str, back: &str, tags: &str, note_id: i64) -> Self {
        Self {
            fields: vec![front.to_string(), back.to_string()],
            tags: tags.to_string(),
            model: None,
            existing_note_id: Some(note_id),
        }
    }

    /// A create must name the note type.
    pub fn validate(&self) -> Result<(), String> {
        let has_type = self
            .model
            .as_ref()
            .and_then(|m| m.note_type_id)
            .is_some();
        if self.existing_note_id.is_none() && !has_type {
            return Err("creating a note requires a note type id".to_string());
        }
        Ok(())
    }
}

impl Message for AddOrUpdateRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        for value in &self.fields {
            w.string(1, value);
        }
        if !self.tags.is_empty() {
            w.string(2, &self.tags);
        }
        if let Some(model) = &self.model {
            let mut m = WireWriter::new();
            if let Some(id) = model.note_type_id.filter(|id| *id != 0) {
                m.int64(1, id);
            }
            if let Some(id) = model.deck_id.filter(|id| *id != 0) {
                m.int64(2, id);
            }
            w.message(3, &m);
        }
        if let Some(note_id) = self.existing_note_id {
            let mut n = WireWriter::new();
            if note_id != 0 {
                n.int64(1, note_id);
            }
            w.message(4, &n);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => msg.fields.push(value.as_str(field)?.to_string()),
                2 => msg.tags = value.as_str(field)?.to_string(),
                3 => {
                    let mut model = ModelSelection::default();
                    let mut inner = WireReader::new(value.as_bytes(field)?);
                    while let Some((f, v)) = inner.next_field()? {
                        match f {
                            1 => model.note_type_id = Some(v.as_i64(f)?),
                            2 => model.deck_id = Some(v.as_i64(f)?),
                            _ => {}
                        }
                    }
                    msg.model = Some(model);
                }
                4 => {
                    let mut note_id = 0;
                    let mut inner = WireReader::new(value.as_bytes(field)?);
                    while let Some((f, v)) = inner.next_field()? {
                        if f == 1 {
                            note_id = v.as_i64(f)?;
                        }
                    }
                    msg.existing_note_id = Some(note_id);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

// ============================================================================
// Search
// ============================================================================

/// `/svc/search/search` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
}

impl Message for SearchRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if !self.query.is_empty() {
            w.string(1, &self.query);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                msg.query = value.as_str(field)?.to_string();
            }
        }
        Ok(msg)
    }
}

/// One search row; `text` is `"front / back"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub note_id: i64,
    pub text: String,
}

/// `/svc/search/search` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

impl Message for SearchResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        for result in &self.results {
            let mut r = WireWriter::new();
            if result.note_id != 0 {
                r.int64(1, result.note_id);
            }
            if !result.text.is_empty() {
                r.string(2, &result.text);
            }
            w.message(1, &r);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field != 1 {
                continue;
            }
            let mut result = SearchResult::default();
            let mut inner = WireReader::new(value.as_bytes(field)?);
            while let Some((f, v)) = inner.next_field()? {
                match f {
                    1 => result.note_id = v.as_i64(f)?,
                    2 => result.text = v.as_str(f)?.to_string(),
                    _ => {}
                }
            }
            msg.results.push(result);
        }
        Ok(msg)
    }
}

// ============================================================================
// Deck management
// ============================================================================

/// `/svc/decks/remove-deck` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveDeckRequest {
    pub deck_id: i64,
}

impl Message for RemoveDeckRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if self.deck_id != 0 {
            w.int64(1, self.deck_id);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                msg.deck_id = value.as_i64(field)?;
            }
        }
        Ok(msg)
    }
}

/// `/svc/decks/rename-deck` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameDeckRequest {
    pub deck_id: i64,
    pub name: String,
}

impl Message for RenameDeckRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if self.deck_id != 0 {
            w.int64(1, self.deck_id);
        }
        if !self.name.is_empty() {
            w.string(2, &self.name);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => msg.deck_id = value.as_i64(field)?,
                2 => msg.name = value.as_str(field)?.to_string(),
                _ => {}
            }
        }
        Ok(msg)
    }
}

/// `/svc/decks/create-deck` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDeckRequest {
    pub name: String,
}

impl Message for CreateDeckRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        if !self.name.is_empty() {
            w.string(1, &self.name);
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                msg.name = value.as_str(field)?.to_string();
            }
        }
        Ok(msg)
    }
}
