//! Collection fixtures
//!
//! Builds small collection files in either schema generation so store and
//! sync tests do not need a real download.

use serde_json::{json, Map, Value};

use crate::fields::{field_checksum, join_fields, sort_field};
use crate::pool::ScratchDatabase;
use crate::schema::{
    queue, SchemaGeneration, COMMON_TABLES, DEFAULT_DECK_ID, LEGACY_TABLES, NORMAL_DECK_KIND,
};
use crate::CollectionError;

/// Id of the two-field "Basic" note type every fixture contains
pub const BASIC_NOTE_TYPE_ID: i64 = 1_700_000_000_001;

/// Creation time stamped on fixture rows, in seconds
pub const FIXTURE_EPOCH_SECS: i64 = 1_700_000_000;

const TABLE_GENERATION_TABLES: &str = r#"
CREATE TABLE graves (
    oid integer NOT NULL, type integer NOT NULL, usn integer NOT NULL,
    PRIMARY KEY (oid, type)
) WITHOUT ROWID;
CREATE TABLE deck_config (
    id integer PRIMARY KEY NOT NULL, name text NOT NULL COLLATE unicase,
    mtime_secs integer NOT NULL, usn integer NOT NULL, config blob NOT NULL
);
CREATE TABLE config (
    KEY text NOT NULL PRIMARY KEY, usn integer NOT NULL,
    mtime_secs integer NOT NULL, val blob NOT NULL
) WITHOUT ROWID;
CREATE TABLE fields (
    ntid integer NOT NULL, ord integer NOT NULL, name text NOT NULL COLLATE unicase,
    config blob NOT NULL, PRIMARY KEY (ntid, ord)
) WITHOUT ROWID;
CREATE TABLE templates (
    ntid integer NOT NULL, ord integer NOT NULL, name text NOT NULL COLLATE unicase,
    mtime_secs integer NOT NULL, usn integer NOT NULL, config blob NOT NULL,
    PRIMARY KEY (ntid, ord)
) WITHOUT ROWID;
CREATE TABLE notetypes (
    id integer NOT NULL PRIMARY KEY, name text NOT NULL COLLATE unicase,
    mtime_secs integer NOT NULL, usn integer NOT NULL, config blob NOT NULL
);
CREATE TABLE decks (
    id integer PRIMARY KEY NOT NULL, name text NOT NULL COLLATE unicase,
    mtime_secs integer NOT NULL, usn integer NOT NULL,
    common blob NOT NULL, kind blob NOT NULL
);
CREATE UNIQUE INDEX idx_decks_name ON decks (name);
"#;

#[derive(Debug, Clone)]
struct FixtureNote {
    id: i64,
    deck_id: i64,
    front: String,
    back: String,
    tags: String,
    queue: i64,
}

/// Describes a collection file to build
#[derive(Debug, Clone)]
pub struct CollectionBuilder {
    generation: SchemaGeneration,
    decks: Vec<(i64, String, bool)>,
    note_types: Vec<(i64, String, usize)>,
    notes: Vec<FixtureNote>,
}

impl CollectionBuilder {
    /// A collection with the default deck and a "Basic" note type
    pub fn new(generation: SchemaGeneration) -> Self {
        Self {
            generation,
            decks: vec![(DEFAULT_DECK_ID, "Default".to_string(), false)],
            note_types: vec![(BASIC_NOTE_TYPE_ID, "Basic".to_string(), 2)],
            notes: Vec::new(),
        }
    }

    /// Start without any note types
    #[must_use]
    pub fn without_note_types(mut self) -> Self {
        self.note_types.clear();
        self
    }

    #[must_use]
    pub fn deck(mut self, id: i64, path: &str) -> Self {
        self.decks.push((id, path.to_string(), false));
        self
    }

    #[must_use]
    pub fn filtered_deck(mut self, id: i64, path: &str) -> Self {
        self.decks.push((id, path.to_string(), true));
        self
    }

    #[must_use]
    pub fn note_type(mut self, id: i64, name: &str, field_count: usize) -> Self {
        self.note_types.push((id, name.to_string(), field_count));
        self
    }

    /// A new-queue note whose single card has id `note_id + 1`
    #[must_use]
    pub fn note(self, note_id: i64, deck_id: i64, front: &str, back: &str) -> Self {
        self.note_in_queue(note_id, deck_id, front, back, queue::NEW)
    }

    #[must_use]
    pub fn note_in_queue(
        mut self,
        note_id: i64,
        deck_id: i64,
        front: &str,
        back: &str,
        queue: i64,
    ) -> Self {
        self.notes.push(FixtureNote {
            id: note_id,
            deck_id,
            front: front.to_string(),
            back: back.to_string(),
            tags: String::new(),
            queue,
        });
        self
    }

    /// Tag the most recently added note
    #[must_use]
    pub fn tagged(mut self, tags: &str) -> Self {
        if let Some(note) = self.notes.last_mut() {
            note.tags = format!(" {tags} ");
        }
        self
    }

    /// Write the collection and return its bytes
    pub async fn build(self) -> Result<Vec<u8>, CollectionError> {
        let db = ScratchDatabase::create_empty().await?;
        let pool = db.pool();
        let failed = |e: sqlx::Error| CollectionError::QueryFailed {
            path: db.path().to_path_buf(),
            message: e.to_string(),
        };

        sqlx::raw_sql(COMMON_TABLES).execute(pool).await.map_err(failed)?;
        let (ver, models, decks) = match self.generation {
            SchemaGeneration::Legacy => {
                sqlx::raw_sql(LEGACY_TABLES).execute(pool).await.map_err(failed)?;
                (11, self.legacy_models(), self.legacy_decks())
            }
            SchemaGeneration::Tables => {
                sqlx::raw_sql(TABLE_GENERATION_TABLES)
                    .execute(pool)
                    .await
                    .map_err(failed)?;
                (18, String::new(), String::new())
            }
        };

        sqlx::query(
            r#"
            INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
            VALUES (1, ?, ?, ?, ?, 0, 0, 0, '{}', ?, ?, '{}', '{}')
            "#,
        )
        .bind(FIXTURE_EPOCH_SECS)
        .bind(FIXTURE_EPOCH_SECS * 1000)
        .bind(FIXTURE_EPOCH_SECS * 1000)
        .bind(ver)
        .bind(models)
        .bind(decks)
        .execute(pool)
        .await
        .map_err(failed)?;

        if self.generation == SchemaGeneration::Tables {
            for (id, path, filtered) in &self.decks {
                let kind: &[u8] = if *filtered { &[0x12, 0x00] } else { NORMAL_DECK_KIND };
                sqlx::query(
                    "INSERT INTO decks (id, name, mtime_secs, usn, common, kind) VALUES (?, ?, ?, 0, ?, ?)",
                )
                .bind(*id)
                .bind(crate::schema::path_to_column(path))
                .bind(FIXTURE_EPOCH_SECS)
                .bind(Vec::<u8>::new())
                .bind(kind)
                .execute(pool)
                .await
                .map_err(failed)?;
            }
            for (id, name, field_count) in &self.note_types {
                sqlx::query(
                    "INSERT INTO notetypes (id, name, mtime_secs, usn, config) VALUES (?, ?, ?, 0, ?)",
                )
                .bind(*id)
                .bind(name)
                .bind(FIXTURE_EPOCH_SECS)
                .bind(Vec::<u8>::new())
                .execute(pool)
                .await
                .map_err(failed)?;
                for ord in 0..*field_count {
                    sqlx::query("INSERT INTO fields (ntid, ord, name, config) VALUES (?, ?, ?, ?)")
                        .bind(*id)
                        .bind(ord as i64)
                        .bind(format!("Field {}", ord + 1))
                        .bind(Vec::<u8>::new())
                        .execute(pool)
                        .await
                        .map_err(failed)?;
                }
            }
        }

        for (due, note) in self.notes.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, 0, '')
                "#,
            )
            .bind(note.id)
            .bind(format!("guid{}", note.id))
            .bind(BASIC_NOTE_TYPE_ID)
            .bind(FIXTURE_EPOCH_SECS)
            .bind(&note.tags)
            .bind(join_fields(&[&note.front, &note.back]))
            .bind(sort_field(&note.front))
            .bind(field_checksum(&note.front))
            .execute(pool)
            .await
            .map_err(failed)?;

            let card_type = if note.queue == queue::NEW { 0 } else { 2 };
            sqlx::query(
                r#"
                INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                   reps, lapses, left, odue, odid, flags, data)
                VALUES (?, ?, ?, 0, ?, 0, ?, ?, ?, 0, 0, 0, 0, 0, 0, 0, 0, '')
                "#,
            )
            .bind(note.id + 1)
            .bind(note.id)
            .bind(note.deck_id)
            .bind(FIXTURE_EPOCH_SECS)
            .bind(card_type)
            .bind(note.queue)
            .bind(due as i64 + 1)
            .execute(pool)
            .await
            .map_err(failed)?;
        }

        db.export().await
    }

    fn legacy_decks(&self) -> String {
        let decks: Map<String, Value> = self
            .decks
            .iter()
            .map(|(id, path, filtered)| {
                let deck = json!({
                    "id": id,
                    "name": path,
                    "mod": FIXTURE_EPOCH_SECS,
                    "usn": 0,
                    "dyn": i64::from(*filtered),
                    "conf": 1,
                    "desc": "",
                    "collapsed": false,
                    "browserCollapsed": false,
                    "newToday": [0, 0],
                    "revToday": [0, 0],
                    "lrnToday": [0, 0],
                    "timeToday": [0, 0],
                    "extendNew": 0,
                    "extendRev": 0,
                });
                (id.to_string(), deck)
            })
            .collect();
        Value::Object(decks).to_string()
    }

    fn legacy_models(&self) -> String {
        let models: Map<String, Value> = self
            .note_types
            .iter()
            .map(|(id, name, field_count)| {
                let flds: Vec<Value> = (0..*field_count)
                    .map(|ord| json!({"name": format!("Field {}", ord + 1), "ord": ord}))
                    .collect();
                let model = json!({
                    "id": id,
                    "name": name,
                    "type": 0,
                    "mod": FIXTURE_EPOCH_SECS,
                    "usn": 0,
                    "sortf": 0,
                    "did": DEFAULT_DECK_ID,
                    "flds": flds,
                    "tmpls": [{"name": "Card 1", "ord": 0, "qfmt": "{{Field 1}}", "afmt": "{{Field 2}}"}],
                });
                (id.to_string(), model)
            })
            .collect();
        Value::Object(models).to_string()
    }
}

/// An empty collection in the given generation
pub async fn empty_collection(generation: SchemaGeneration) -> Result<Vec<u8>, CollectionError> {
    CollectionBuilder::new(generation).build().await
}
