//! Typed access to an open collection
//!
//! Reads decks, notes and cards and applies the mutations the sync layer
//! needs. Every changed row is stamped with the pending-sync marker and a
//! fresh modification time so the desktop application picks the edits up
//! after the next full download.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rememberit_core::domain::{Card, CardId, Deck, DeckId, NoteId, NoteTypeId, PATH_SEPARATOR};
use rememberit_core::ports::Clock;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::fields::{
    field_checksum, front_back, join_fields, new_guid, sort_field, split_fields,
    tags_from_column, tags_to_column,
};
use crate::pool::ScratchDatabase;
use crate::schema::{
    grave, is_missing_table, path_from_column, path_to_column, queue, SchemaGeneration,
    CARD_TYPE_NEW, DEFAULT_DECK_ID, FILTERED_DECK_KIND_TAG, NORMAL_DECK_KIND, USN_PENDING,
};
use crate::CollectionError;

/// Note type chosen for new notes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTypeInfo {
    pub id: NoteTypeId,
    pub name: String,
    pub field_count: usize,
}

/// What a deck removal deleted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedDeck {
    pub deck_ids: Vec<DeckId>,
    pub notes: usize,
    pub cards: usize,
}

#[derive(Debug, Clone)]
struct DeckRow {
    id: i64,
    path: String,
    filtered: bool,
}

/// An opened collection
pub struct CollectionStore {
    db: ScratchDatabase,
    generation: SchemaGeneration,
    clock: Arc<dyn Clock>,
    last_id: AtomicI64,
    preferred_note_type: Option<NoteTypeId>,
}

impl CollectionStore {
    /// Open collection bytes in a scratch directory
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::OpenFailed` if the bytes are not a database
    /// and `CollectionError::QueryFailed` if the schema cannot be inspected.
    pub async fn open(bytes: &[u8], clock: Arc<dyn Clock>) -> Result<Self, CollectionError> {
        let db = ScratchDatabase::from_bytes(bytes).await?;
        let generation = match sqlx::query("SELECT id FROM decks LIMIT 1")
            .fetch_optional(db.pool())
            .await
        {
            Ok(_) => SchemaGeneration::Tables,
            Err(e) if is_missing_table(&e) => SchemaGeneration::Legacy,
            Err(e) => {
                return Err(CollectionError::QueryFailed {
                    path: db.path().to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        info!(%generation, size = bytes.len(), "Collection opened");

        Ok(Self {
            db,
            generation,
            clock,
            last_id: AtomicI64::new(0),
            preferred_note_type: None,
        })
    }

    /// Use this note type for new notes when it has a front and back field
    #[must_use]
    pub fn with_note_type(mut self, note_type: Option<NoteTypeId>) -> Self {
        self.preferred_note_type = note_type;
        self
    }

    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    fn query_failed(&self, err: impl std::fmt::Display) -> CollectionError {
        CollectionError::QueryFailed {
            path: self.db.path().to_path_buf(),
            message: err.to_string(),
        }
    }

    fn corrupt(&self, message: impl Into<String>) -> CollectionError {
        CollectionError::Corrupt {
            path: self.db.path().to_path_buf(),
            message: message.into(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    async fn deck_rows(&self) -> Result<Vec<DeckRow>, CollectionError> {
        match self.deck_rows_from_table().await {
            Ok(rows) => Ok(rows),
            Err(e) if is_missing_table(&e) => {
                debug!("No decks table, reading deck JSON from col");
                self.deck_rows_from_json().await
            }
            Err(e) => Err(self.query_failed(e)),
        }
    }

    async fn deck_rows_from_table(&self) -> Result<Vec<DeckRow>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, kind FROM decks")
            .fetch_all(self.db.pool())
            .await?;
        rows.iter()
            .map(|row| {
                let kind: Vec<u8> = row.try_get("kind")?;
                Ok(DeckRow {
                    id: row.try_get("id")?,
                    path: path_from_column(row.try_get::<&str, _>("name")?),
                    filtered: kind.first() == Some(&FILTERED_DECK_KIND_TAG),
                })
            })
            .collect()
    }

    async fn deck_rows_from_json(&self) -> Result<Vec<DeckRow>, CollectionError> {
        let decks = self.load_col_json("decks").await?;
        decks
            .iter()
            .map(|(key, deck)| {
                let id = json_id(key, deck)
                    .ok_or_else(|| self.corrupt(format!("deck '{key}' has no id")))?;
                let path = deck
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.corrupt(format!("deck {id} has no name")))?;
                Ok(DeckRow {
                    id,
                    path: path.to_string(),
                    filtered: deck.get("dyn").and_then(Value::as_i64).unwrap_or(0) != 0,
                })
            })
            .collect()
    }

    async fn load_col_json(&self, column: &'static str) -> Result<Map<String, Value>, CollectionError> {
        let sql = format!("SELECT {column} FROM col LIMIT 1");
        let text: String = sqlx::query_scalar(&sql)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(self.corrupt(format!("col.{column} is not an object"))),
            Err(e) => Err(self.corrupt(format!("col.{column}: {e}"))),
        }
    }

    async fn save_col_json(
        &self,
        conn: &mut SqliteConnection,
        column: &'static str,
        map: Map<String, Value>,
    ) -> Result<(), CollectionError> {
        let sql = format!("UPDATE col SET {column} = ?");
        let text = Value::Object(map).to_string();
        sqlx::query(&sql)
            .bind(text)
            .execute(conn)
            .await
            .map_err(|e| self.query_failed(e))?;
        Ok(())
    }

    async fn queue_counts(&self) -> Result<HashMap<i64, (u32, u32, u32, u32)>, CollectionError> {
        let rows = sqlx::query("SELECT did, queue, count(*) AS n FROM cards GROUP BY did, queue")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?;

        let mut counts: HashMap<i64, (u32, u32, u32, u32)> = HashMap::new();
        for row in rows {
            let did: i64 = row.try_get("did").map_err(|e| self.query_failed(e))?;
            let q: i64 = row.try_get("queue").map_err(|e| self.query_failed(e))?;
            let n: i64 = row.try_get("n").map_err(|e| self.query_failed(e))?;
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            let entry = counts.entry(did).or_default();
            match q {
                queue::NEW => entry.0 += n,
                queue::LEARN | queue::DAY_LEARN => entry.1 += n,
                queue::REVIEW => entry.2 += n,
                _ => {}
            }
            entry.3 += n;
        }
        Ok(counts)
    }

    /// All decks with their counts, ordered by path
    ///
    /// The built-in default deck is left out when it is empty and other
    /// decks exist, as the desktop deck browser does.
    pub async fn list_decks(&self) -> Result<Vec<Deck>, CollectionError> {
        let rows = self.deck_rows().await?;
        let counts = self.queue_counts().await?;

        let mut decks: Vec<Deck> = rows
            .iter()
            .map(|row| {
                let mut deck = Deck::new(DeckId::new(row.id), row.path.clone());
                if let Some(&(new, learn, review, total)) = counts.get(&row.id) {
                    deck.counts.new = new;
                    deck.counts.learn = learn;
                    deck.counts.review = review;
                    deck.counts.total = total;
                }
                deck
            })
            .collect();

        let totals: Vec<(String, u32)> = decks
            .iter()
            .map(|d| (d.path.clone(), d.counts.total))
            .collect();
        for deck in &mut decks {
            let prefix = format!("{}{PATH_SEPARATOR}", deck.path);
            deck.counts.total_including_children = totals
                .iter()
                .filter(|(path, _)| *path == deck.path || path.starts_with(&prefix))
                .map(|(_, n)| n)
                .sum();
        }

        if decks.len() > 1 {
            decks.retain(|d| {
                d.id.as_i64() != DEFAULT_DECK_ID || d.counts.total_including_children > 0
            });
        }
        decks.sort_by_key(|d| d.path.to_lowercase());
        Ok(decks)
    }

    /// Cards grouped by deck, one per note
    pub async fn list_cards(&self) -> Result<HashMap<DeckId, Vec<Card>>, CollectionError> {
        let rows = sqlx::query(
            r#"
            SELECT c.nid AS nid, c.did AS did, n.flds AS flds, n.tags AS tags
            FROM cards c
            JOIN notes n ON n.id = c.nid
            ORDER BY c.did, c.nid, c.ord
            "#,
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| self.query_failed(e))?;

        let mut seen: HashSet<(i64, i64)> = HashSet::new();
        let mut by_deck: HashMap<DeckId, Vec<Card>> = HashMap::new();
        for row in rows {
            let nid: i64 = row.try_get("nid").map_err(|e| self.query_failed(e))?;
            let did: i64 = row.try_get("did").map_err(|e| self.query_failed(e))?;
            if !seen.insert((did, nid)) {
                continue;
            }
            let flds: String = row.try_get("flds").map_err(|e| self.query_failed(e))?;
            let tags: String = row.try_get("tags").map_err(|e| self.query_failed(e))?;
            let (front, back) = front_back(&flds);
            let mut card = Card::new(Some(NoteId::new(nid)), front, back).in_deck(DeckId::new(did));
            card.tags = tags_from_column(&tags);
            card.raw_text = flds;
            by_deck.entry(DeckId::new(did)).or_default().push(card);
        }
        Ok(by_deck)
    }

    /// Decks with their cards attached
    pub async fn load_decks(&self) -> Result<Vec<Deck>, CollectionError> {
        let mut decks = self.list_decks().await?;
        let mut cards = self.list_cards().await?;
        for deck in &mut decks {
            deck.cards = cards.remove(&deck.id).unwrap_or_default();
        }
        debug!(decks = decks.len(), "Loaded decks from collection");
        Ok(decks)
    }

    /// Find a deck by path, ignoring case
    pub async fn find_deck(&self, path: &str) -> Result<Option<DeckId>, CollectionError> {
        if self.generation == SchemaGeneration::Tables {
            let id: Option<i64> =
                sqlx::query_scalar("SELECT id FROM decks WHERE name = ? COLLATE unicase")
                    .bind(path_to_column(path))
                    .fetch_optional(self.db.pool())
                    .await
                    .map_err(|e| self.query_failed(e))?;
            return Ok(id.map(DeckId::new));
        }
        let wanted = path.to_lowercase();
        Ok(self
            .deck_rows()
            .await?
            .into_iter()
            .find(|row| row.path.to_lowercase() == wanted)
            .map(|row| DeckId::new(row.id)))
    }

    /// Note type for new notes
    ///
    /// The configured type wins if it exists with at least two fields;
    /// otherwise a type named "Basic", otherwise the oldest two-field type.
    pub async fn resolve_note_type(&self) -> Result<NoteTypeInfo, CollectionError> {
        let candidates = match self.generation {
            SchemaGeneration::Tables => self.note_types_from_tables().await?,
            SchemaGeneration::Legacy => self.note_types_from_json().await?,
        };
        let usable: Vec<&NoteTypeInfo> = candidates.iter().filter(|nt| nt.field_count >= 2).collect();

        if let Some(preferred) = self.preferred_note_type {
            if let Some(found) = usable.iter().find(|nt| nt.id == preferred) {
                return Ok((*found).clone());
            }
            warn!(note_type = %preferred, "Configured note type not usable, choosing another");
        }

        usable
            .iter()
            .find(|nt| nt.name.eq_ignore_ascii_case("Basic"))
            .or_else(|| usable.first())
            .map(|nt| (*nt).clone())
            .ok_or_else(|| CollectionError::NoNoteType {
                path: self.db.path().to_path_buf(),
            })
    }

    async fn note_types_from_tables(&self) -> Result<Vec<NoteTypeInfo>, CollectionError> {
        let rows = sqlx::query(
            r#"
            SELECT nt.id AS id, nt.name AS name, count(f.ord) AS n
            FROM notetypes nt
            LEFT JOIN fields f ON f.ntid = nt.id
            GROUP BY nt.id, nt.name
            ORDER BY nt.id
            "#,
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| self.query_failed(e))?;

        rows.iter()
            .map(|row| {
                let n: i64 = row.try_get("n").map_err(|e| self.query_failed(e))?;
                Ok(NoteTypeInfo {
                    id: NoteTypeId::new(row.try_get("id").map_err(|e| self.query_failed(e))?),
                    name: row.try_get("name").map_err(|e| self.query_failed(e))?,
                    field_count: usize::try_from(n).unwrap_or(0),
                })
            })
            .collect()
    }

    async fn note_types_from_json(&self) -> Result<Vec<NoteTypeInfo>, CollectionError> {
        let models = self.load_col_json("models").await?;
        let mut types: Vec<NoteTypeInfo> = models
            .iter()
            .filter(|(_, model)| model.get("type").and_then(Value::as_i64).unwrap_or(0) == 0)
            .filter_map(|(key, model)| {
                Some(NoteTypeInfo {
                    id: NoteTypeId::new(json_id(key, model)?),
                    name: model.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    field_count: model.get("flds").and_then(Value::as_array).map_or(0, Vec::len),
                })
            })
            .collect();
        types.sort_by_key(|nt| nt.id);
        Ok(types)
    }

    // ------------------------------------------------------------------
    // Id allocation
    // ------------------------------------------------------------------

    fn id_floor(&self) -> i64 {
        self.clock
            .now_millis()
            .max(self.last_id.load(Ordering::SeqCst) + 1)
    }

    fn claim_id(&self, taken: impl Fn(i64) -> bool) -> i64 {
        let mut id = self.id_floor();
        while taken(id) {
            id += 1;
        }
        self.last_id.store(id, Ordering::SeqCst);
        id
    }

    /// Next free id in `table`: the current time in milliseconds, bumped
    /// past earlier allocations and existing rows
    async fn allocate_id(&self, table: &'static str) -> Result<i64, CollectionError> {
        let sql = format!("SELECT id FROM {table} WHERE id >= ?");
        let taken: HashSet<i64> = sqlx::query_scalar(&sql)
            .bind(self.id_floor())
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?
            .into_iter()
            .collect();
        Ok(self.claim_id(|id| taken.contains(&id)))
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Check that new cards can go into `deck_id`
    async fn ensure_normal_deck(&self, deck_id: DeckId) -> Result<(), CollectionError> {
        let rows = self.deck_rows().await?;
        match rows.iter().find(|row| row.id == deck_id.as_i64()) {
            None => Err(CollectionError::DeckNotFound(deck_id.to_string())),
            Some(row) if row.filtered => Err(CollectionError::FilteredDeck(row.path.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Add a note with one new card in `deck_id`
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::DeckNotFound` for an unknown deck,
    /// `CollectionError::FilteredDeck` for a filtered one, and
    /// `CollectionError::NoNoteType` if no two-field note type exists.
    pub async fn insert_note(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        tags: &str,
    ) -> Result<(NoteId, CardId), CollectionError> {
        self.ensure_normal_deck(deck_id).await?;
        let note_type = self.resolve_note_type().await?;

        let note_id = self.allocate_id("notes").await?;
        let card_id = self.allocate_id("cards").await?;
        let due: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(due), 0) + 1 FROM cards WHERE type = ?")
            .bind(CARD_TYPE_NEW)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?;

        let mut fields = vec![front.to_string(), back.to_string()];
        fields.resize(note_type.field_count.max(2), String::new());
        let now = self.clock.now_secs();

        let mut tx = self.db.pool().begin().await.map_err(|e| self.query_failed(e))?;

        sqlx::query(
            r#"
            INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, '')
            "#,
        )
        .bind(note_id)
        .bind(new_guid())
        .bind(note_type.id.as_i64())
        .bind(now)
        .bind(USN_PENDING)
        .bind(tags_to_column(tags))
        .bind(join_fields(&fields))
        .bind(sort_field(front))
        .bind(field_checksum(front))
        .execute(&mut *tx)
        .await
        .map_err(|e| self.query_failed(e))?;

        sqlx::query(
            r#"
            INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                               reps, lapses, left, odue, odid, flags, data)
            VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, 0, 0, 0, 0, 0, 0, 0, 0, '')
            "#,
        )
        .bind(card_id)
        .bind(note_id)
        .bind(deck_id.as_i64())
        .bind(now)
        .bind(USN_PENDING)
        .bind(CARD_TYPE_NEW)
        .bind(queue::NEW)
        .bind(due)
        .execute(&mut *tx)
        .await
        .map_err(|e| self.query_failed(e))?;

        tx.commit().await.map_err(|e| self.query_failed(e))?;

        debug!(note_id, card_id, deck_id = %deck_id, note_type = %note_type.id, "Inserted note");
        Ok((NoteId::new(note_id), CardId::new(card_id)))
    }

    /// Replace the front and back of a note
    ///
    /// Fields past the second are kept. `tags` of `None` keeps the current
    /// tags.
    pub async fn update_note(
        &self,
        note_id: NoteId,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<(), CollectionError> {
        let row = sqlx::query("SELECT flds, tags FROM notes WHERE id = ?")
            .bind(note_id.as_i64())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?
            .ok_or(CollectionError::NoteNotFound(note_id))?;
        let flds: String = row.try_get("flds").map_err(|e| self.query_failed(e))?;
        let current_tags: String = row.try_get("tags").map_err(|e| self.query_failed(e))?;

        let mut fields: Vec<String> = split_fields(&flds).into_iter().map(str::to_string).collect();
        if fields.len() < 2 {
            fields.resize(2, String::new());
        }
        fields[0] = front.to_string();
        fields[1] = back.to_string();
        let tags = tags.map_or(current_tags, tags_to_column);

        sqlx::query(
            r#"
            UPDATE notes SET flds = ?, sfld = ?, csum = ?, tags = ?, mod = ?, usn = ?
            WHERE id = ?
            "#,
        )
        .bind(join_fields(&fields))
        .bind(sort_field(front))
        .bind(field_checksum(front))
        .bind(tags)
        .bind(self.clock.now_secs())
        .bind(USN_PENDING)
        .bind(note_id.as_i64())
        .execute(self.db.pool())
        .await
        .map_err(|e| self.query_failed(e))?;

        debug!(note_id = %note_id, "Updated note");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Decks
    // ------------------------------------------------------------------

    /// Create a deck, and any missing parents, returning its id
    ///
    /// An existing deck with the same path (ignoring case) is returned as is.
    pub async fn insert_deck(&self, path: &str) -> Result<DeckId, CollectionError> {
        let rows = self.deck_rows().await?;
        let mut known: HashMap<String, i64> = rows
            .iter()
            .map(|row| (row.path.to_lowercase(), row.id))
            .collect();
        let taken: HashSet<i64> = rows.iter().map(|row| row.id).collect();

        let components: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let mut created: Vec<(i64, String)> = Vec::new();
        let mut target = None;
        for depth in 1..=components.len() {
            let prefix = components[..depth].join(PATH_SEPARATOR);
            let id = match known.get(&prefix.to_lowercase()) {
                Some(&id) => id,
                None => {
                    let id = self.claim_id(|id| taken.contains(&id));
                    known.insert(prefix.to_lowercase(), id);
                    created.push((id, prefix));
                    id
                }
            };
            target = Some(id);
        }
        let target = target.ok_or_else(|| CollectionError::DeckNotFound(path.to_string()))?;

        if created.is_empty() {
            debug!(path, deck_id = target, "Deck already exists");
            return Ok(DeckId::new(target));
        }

        let legacy_decks = match self.generation {
            SchemaGeneration::Legacy => Some(self.load_col_json("decks").await?),
            SchemaGeneration::Tables => None,
        };

        let now = self.clock.now_secs();
        let mut tx = self.db.pool().begin().await.map_err(|e| self.query_failed(e))?;
        match legacy_decks {
            None => {
                for (id, deck_path) in &created {
                    sqlx::query(
                        r#"
                        INSERT INTO decks (id, name, mtime_secs, usn, common, kind)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(*id)
                    .bind(path_to_column(deck_path))
                    .bind(now)
                    .bind(USN_PENDING)
                    .bind(Vec::<u8>::new())
                    .bind(NORMAL_DECK_KIND)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| self.query_failed(e))?;
                }
            }
            Some(mut decks) => {
                let template = legacy_template(&decks);
                for (id, deck_path) in &created {
                    decks.insert(
                        id.to_string(),
                        legacy_deck(template.as_ref(), *id, deck_path, now),
                    );
                }
                self.save_col_json(&mut *tx, "decks", decks).await?;
            }
        }
        tx.commit().await.map_err(|e| self.query_failed(e))?;

        info!(path, deck_id = target, created = created.len(), "Created deck");
        Ok(DeckId::new(target))
    }

    /// Rename a deck; its descendants move with it
    pub async fn rename_deck(&self, deck_id: DeckId, new_path: &str) -> Result<(), CollectionError> {
        let rows = self.deck_rows().await?;
        let old_path = rows
            .iter()
            .find(|row| row.id == deck_id.as_i64())
            .map(|row| row.path.clone())
            .ok_or_else(|| CollectionError::DeckNotFound(deck_id.to_string()))?;

        if old_path == new_path {
            return Ok(());
        }
        if rows
            .iter()
            .any(|row| row.id != deck_id.as_i64() && row.path.to_lowercase() == new_path.to_lowercase())
        {
            return Err(CollectionError::DeckExists(new_path.to_string()));
        }

        let old_prefix = format!("{old_path}{PATH_SEPARATOR}");
        let moved: Vec<(i64, String)> = rows
            .iter()
            .filter_map(|row| {
                if row.path == old_path {
                    Some((row.id, new_path.to_string()))
                } else {
                    row.path
                        .strip_prefix(&old_prefix)
                        .map(|rest| (row.id, format!("{new_path}{PATH_SEPARATOR}{rest}")))
                }
            })
            .collect();

        // Moving under a parent that does not exist yet creates it.
        if let Some((parent, _)) = new_path.rsplit_once(PATH_SEPARATOR) {
            if !parent.to_lowercase().starts_with(&old_path.to_lowercase()) {
                self.insert_deck(parent).await?;
            }
        }

        let legacy_decks = match self.generation {
            SchemaGeneration::Legacy => Some(self.load_col_json("decks").await?),
            SchemaGeneration::Tables => None,
        };

        let now = self.clock.now_secs();
        let mut tx = self.db.pool().begin().await.map_err(|e| self.query_failed(e))?;
        match legacy_decks {
            None => {
                for (id, path) in &moved {
                    sqlx::query("UPDATE decks SET name = ?, mtime_secs = ?, usn = ? WHERE id = ?")
                        .bind(path_to_column(path))
                        .bind(now)
                        .bind(USN_PENDING)
                        .bind(*id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| self.query_failed(e))?;
                }
            }
            Some(mut decks) => {
                for (id, path) in &moved {
                    if let Some(Value::Object(deck)) = decks.get_mut(&id.to_string()) {
                        deck.insert("name".into(), Value::from(path.as_str()));
                        deck.insert("mod".into(), Value::from(now));
                        deck.insert("usn".into(), Value::from(USN_PENDING));
                    }
                }
                self.save_col_json(&mut *tx, "decks", decks).await?;
            }
        }
        tx.commit().await.map_err(|e| self.query_failed(e))?;

        info!(deck_id = %deck_id, from = %old_path, to = new_path, moved = moved.len(), "Renamed deck");
        Ok(())
    }

    /// Delete a deck, its descendants, their cards, and notes left without
    /// cards, recording each deletion in the graves table
    ///
    /// The built-in default deck cannot be deleted; it is emptied instead.
    pub async fn remove_deck(&self, deck_id: DeckId) -> Result<RemovedDeck, CollectionError> {
        let rows = self.deck_rows().await?;
        let root = rows
            .iter()
            .find(|row| row.id == deck_id.as_i64())
            .ok_or_else(|| CollectionError::DeckNotFound(deck_id.to_string()))?;
        let prefix = format!("{}{PATH_SEPARATOR}", root.path);
        let deck_ids: Vec<i64> = rows
            .iter()
            .filter(|row| row.id == root.id || row.path.starts_with(&prefix))
            .map(|row| row.id)
            .collect();

        let mut card_ids: Vec<i64> = Vec::new();
        let mut touched_notes: HashSet<i64> = HashSet::new();
        for &did in &deck_ids {
            let cards = sqlx::query("SELECT id, nid FROM cards WHERE did = ?")
                .bind(did)
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| self.query_failed(e))?;
            for card in cards {
                card_ids.push(card.try_get("id").map_err(|e| self.query_failed(e))?);
                touched_notes.insert(card.try_get("nid").map_err(|e| self.query_failed(e))?);
            }
        }
        let legacy_decks = match self.generation {
            SchemaGeneration::Legacy => Some(self.load_col_json("decks").await?),
            SchemaGeneration::Tables => None,
        };

        let mut tx = self.db.pool().begin().await.map_err(|e| self.query_failed(e))?;

        for &cid in &card_ids {
            sqlx::query("DELETE FROM cards WHERE id = ?")
                .bind(cid)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.query_failed(e))?;
            self.add_grave(&mut *tx, cid, grave::CARD).await?;
        }

        let mut removed_notes = 0;
        for &nid in &touched_notes {
            let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM cards WHERE nid = ?")
                .bind(nid)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| self.query_failed(e))?;
            if remaining == 0 {
                sqlx::query("DELETE FROM notes WHERE id = ?")
                    .bind(nid)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| self.query_failed(e))?;
                self.add_grave(&mut *tx, nid, grave::NOTE).await?;
                removed_notes += 1;
            }
        }

        let doomed: Vec<i64> = deck_ids
            .iter()
            .copied()
            .filter(|id| *id != DEFAULT_DECK_ID)
            .collect();
        match legacy_decks {
            None => {
                for &did in &doomed {
                    sqlx::query("DELETE FROM decks WHERE id = ?")
                        .bind(did)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| self.query_failed(e))?;
                }
            }
            Some(mut decks) => {
                for did in &doomed {
                    decks.remove(&did.to_string());
                }
                self.save_col_json(&mut *tx, "decks", decks).await?;
            }
        }
        for &did in &doomed {
            self.add_grave(&mut *tx, did, grave::DECK).await?;
        }

        tx.commit().await.map_err(|e| self.query_failed(e))?;

        let removed = RemovedDeck {
            deck_ids: doomed.into_iter().map(DeckId::new).collect(),
            notes: removed_notes,
            cards: card_ids.len(),
        };
        info!(
            deck_id = %deck_id,
            decks = removed.deck_ids.len(),
            notes = removed.notes,
            cards = removed.cards,
            "Removed deck"
        );
        Ok(removed)
    }

    async fn add_grave(
        &self,
        conn: &mut SqliteConnection,
        oid: i64,
        kind: i64,
    ) -> Result<(), CollectionError> {
        sqlx::query("INSERT OR IGNORE INTO graves (usn, oid, type) VALUES (?, ?, ?)")
            .bind(USN_PENDING)
            .bind(oid)
            .bind(kind)
            .execute(conn)
            .await
            .map_err(|e| self.query_failed(e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Bump the collection modification time
    pub async fn touch_collection_modified(&self) -> Result<(), CollectionError> {
        sqlx::query("UPDATE col SET mod = ?")
            .bind(self.clock.now_millis())
            .execute(self.db.pool())
            .await
            .map_err(|e| self.query_failed(e))?;
        Ok(())
    }

    /// Close the collection and return its bytes
    pub async fn export(self) -> Result<Vec<u8>, CollectionError> {
        self.db.export().await
    }
}

/// Id of a JSON deck or model: the `id` member, else the map key
fn json_id(key: &str, value: &Value) -> Option<i64> {
    value
        .get("id")
        .and_then(|id| id.as_i64().or_else(|| id.as_str().and_then(|s| s.parse().ok())))
        .or_else(|| key.parse().ok())
}

/// An existing normal deck to copy unknown members from
fn legacy_template(decks: &Map<String, Value>) -> Option<Map<String, Value>> {
    let normal = |deck: &&Value| deck.get("dyn").and_then(Value::as_i64).unwrap_or(0) == 0;
    decks
        .get(&DEFAULT_DECK_ID.to_string())
        .filter(normal)
        .or_else(|| decks.values().find(normal))
        .and_then(Value::as_object)
        .cloned()
}

fn legacy_deck(template: Option<&Map<String, Value>>, id: i64, path: &str, now: i64) -> Value {
    let mut deck = template.cloned().unwrap_or_default();
    let zero_pair = || Value::from(vec![0, 0]);
    deck.insert("id".into(), Value::from(id));
    deck.insert("name".into(), Value::from(path));
    deck.insert("mod".into(), Value::from(now));
    deck.insert("usn".into(), Value::from(USN_PENDING));
    deck.insert("desc".into(), Value::from(""));
    deck.insert("dyn".into(), Value::from(0));
    deck.insert("collapsed".into(), Value::from(false));
    deck.insert("browserCollapsed".into(), Value::from(false));
    for key in ["newToday", "revToday", "lrnToday", "timeToday"] {
        deck.insert(key.into(), zero_pair());
    }
    deck.entry("conf").or_insert_with(|| Value::from(1));
    deck.entry("extendNew").or_insert_with(|| Value::from(0));
    deck.entry("extendRev").or_insert_with(|| Value::from(0));
    Value::Object(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_id_prefers_member() {
        assert_eq!(json_id("5", &json!({"id": 7})), Some(7));
        assert_eq!(json_id("5", &json!({"id": "8"})), Some(8));
        assert_eq!(json_id("5", &json!({})), Some(5));
        assert_eq!(json_id("x", &json!({})), None);
    }

    #[test]
    fn test_legacy_deck_copies_template() {
        let template = json!({"id": 1, "name": "Default", "conf": 3, "dyn": 0, "extra": true});
        let decks: Map<String, Value> =
            [("1".to_string(), template)].into_iter().collect();
        let tpl = legacy_template(&decks);
        let deck = legacy_deck(tpl.as_ref(), 42, "Spanish::Verbs", 100);
        assert_eq!(deck["id"], 42);
        assert_eq!(deck["name"], "Spanish::Verbs");
        assert_eq!(deck["conf"], 3);
        assert_eq!(deck["extra"], true);
        assert_eq!(deck["usn"], -1);
        assert_eq!(deck["newToday"], json!([0, 0]));
    }

    #[test]
    fn test_legacy_deck_without_template() {
        let deck = legacy_deck(None, 9, "A", 1);
        assert_eq!(deck["conf"], 1);
        assert_eq!(deck["dyn"], 0);
    }
}
