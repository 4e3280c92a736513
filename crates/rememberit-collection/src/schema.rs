//! Collection schema facts
//!
//! Two layouts are in circulation. Schema 11 keeps decks and note types as
//! JSON objects in the single `col` row; schema 18 moves them into their own
//! tables. Full-sync downloads may arrive in either form.

/// Layout of the collection file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaGeneration {
    /// Decks and models as JSON in `col`
    Legacy,
    /// `decks`, `notetypes` and `fields` tables
    Tables,
}

impl std::fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaGeneration::Legacy => write!(f, "schema 11"),
            SchemaGeneration::Tables => write!(f, "schema 18"),
        }
    }
}

/// Update sequence number marking a row as changed since the last sync
pub const USN_PENDING: i64 = -1;

/// Separator between deck path components in the `decks.name` column
pub const DECK_NAME_SEPARATOR: char = '\x1f';

/// Protobuf `kind` blob of a normal deck using options group 1
pub const NORMAL_DECK_KIND: &[u8] = &[0x0A, 0x02, 0x08, 0x01];

/// Leading byte of a filtered deck's `kind` blob (field 2, length-delimited)
pub const FILTERED_DECK_KIND_TAG: u8 = 0x12;

/// The deck every collection starts with
pub const DEFAULT_DECK_ID: i64 = 1;

/// Card queue values
pub mod queue {
    pub const NEW: i64 = 0;
    pub const LEARN: i64 = 1;
    pub const REVIEW: i64 = 2;
    pub const DAY_LEARN: i64 = 3;
}

/// Card type of a never-studied card
pub const CARD_TYPE_NEW: i64 = 0;

/// `graves.type` values
pub mod grave {
    pub const CARD: i64 = 0;
    pub const NOTE: i64 = 1;
    pub const DECK: i64 = 2;
}

/// SQLite collation used for deck names
pub const UNICASE: &str = "unicase";

/// Tables shared by both generations
pub(crate) const COMMON_TABLES: &str = r#"
CREATE TABLE notes (
    id integer PRIMARY KEY, guid text NOT NULL, mid integer NOT NULL,
    mod integer NOT NULL, usn integer NOT NULL, tags text NOT NULL,
    flds text NOT NULL, sfld integer NOT NULL, csum integer NOT NULL,
    flags integer NOT NULL, data text NOT NULL
);
CREATE TABLE cards (
    id integer PRIMARY KEY, nid integer NOT NULL, did integer NOT NULL,
    ord integer NOT NULL, mod integer NOT NULL, usn integer NOT NULL,
    type integer NOT NULL, queue integer NOT NULL, due integer NOT NULL,
    ivl integer NOT NULL, factor integer NOT NULL, reps integer NOT NULL,
    lapses integer NOT NULL, left integer NOT NULL, odue integer NOT NULL,
    odid integer NOT NULL, flags integer NOT NULL, data text NOT NULL
);
CREATE TABLE revlog (
    id integer PRIMARY KEY, cid integer NOT NULL, usn integer NOT NULL,
    ease integer NOT NULL, ivl integer NOT NULL, lastIvl integer NOT NULL,
    factor integer NOT NULL, time integer NOT NULL, type integer NOT NULL
);
CREATE TABLE col (
    id integer PRIMARY KEY, crt integer NOT NULL, mod integer NOT NULL,
    scm integer NOT NULL, ver integer NOT NULL, dty integer NOT NULL,
    usn integer NOT NULL, ls integer NOT NULL, conf text NOT NULL,
    models text NOT NULL, decks text NOT NULL, dconf text NOT NULL,
    tags text NOT NULL
);
CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
"#;

/// Schema 11 graves table
pub(crate) const LEGACY_TABLES: &str = r#"
CREATE TABLE graves (usn integer NOT NULL, oid integer NOT NULL, type integer NOT NULL);
"#;

/// Whether a query failed because the table does not exist
pub fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("no such table"),
        _ => false,
    }
}

/// Deck path as stored in `decks.name`
pub fn path_to_column(path: &str) -> String {
    path.replace(rememberit_core::domain::PATH_SEPARATOR, &DECK_NAME_SEPARATOR.to_string())
}

/// Deck path from a `decks.name` column
pub fn path_from_column(column: &str) -> String {
    column.replace(DECK_NAME_SEPARATOR, rememberit_core::domain::PATH_SEPARATOR)
}
