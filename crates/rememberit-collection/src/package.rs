//! `.apkg` deck packages
//!
//! A package is a zip archive holding a schema 11 collection under
//! `collection.anki2` and a `media` manifest. Packages written here carry one
//! deck (plus its parents) and a two-field "Basic Model" note type, with every
//! card new. Media files are not included.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use rememberit_core::domain::{Deck, NoteTypeId};
use rememberit_core::ports::Clock;
use serde_json::json;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::pool::ScratchDatabase;
use crate::schema::{COMMON_TABLES, DEFAULT_DECK_ID, LEGACY_TABLES};
use crate::store::CollectionStore;
use crate::CollectionError;

/// Archive entry holding the collection database
pub const COLLECTION_ENTRY: &str = "collection.anki2";

/// Archive entry mapping media file numbers to names
pub const MEDIA_ENTRY: &str = "media";

/// Note type id used for exported notes
pub const PACKAGE_NOTE_TYPE_ID: i64 = 1_763_445_109_221;

/// Write `deck` as a package at `path`
///
/// # Errors
///
/// Returns `CollectionError::Package` if the archive cannot be assembled or
/// written, and store errors if the collection cannot be built.
pub async fn write_package(
    deck: &Deck,
    clock: Arc<dyn Clock>,
    path: &Path,
) -> Result<(), CollectionError> {
    let collection = package_collection(deck, clock).await?;
    let archive = zip_collection(&collection).map_err(|e| package_error(path, e))?;
    std::fs::write(path, &archive).map_err(|e| package_error(path, e))?;
    info!(deck = %deck.path, cards = deck.cards.len(), path = %path.display(), "Wrote package");
    Ok(())
}

/// Collection bytes stored in the package at `path`
///
/// # Errors
///
/// Returns `CollectionError::Package` if the file is not a zip archive or
/// has no `collection.anki2` entry.
pub fn read_package(path: &Path) -> Result<Vec<u8>, CollectionError> {
    let bytes = std::fs::read(path).map_err(|e| package_error(path, e))?;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| package_error(path, e))?;
    let mut entry = archive
        .by_name(COLLECTION_ENTRY)
        .map_err(|e| package_error(path, e))?;
    let mut collection = Vec::new();
    entry
        .read_to_end(&mut collection)
        .map_err(|e| package_error(path, e))?;
    Ok(collection)
}

/// Schema 11 collection holding `deck` and its cards
async fn package_collection(deck: &Deck, clock: Arc<dyn Clock>) -> Result<Vec<u8>, CollectionError> {
    let base = empty_package_collection(clock.now_secs()).await?;
    let store = CollectionStore::open(&base, clock)
        .await?
        .with_note_type(Some(NoteTypeId::new(PACKAGE_NOTE_TYPE_ID)));

    let deck_id = store.insert_deck(&deck.path).await?;
    for card in &deck.cards {
        store
            .insert_note(deck_id, &card.front, &card.back, &card.tags)
            .await?;
    }
    store.touch_collection_modified().await?;
    store.export().await
}

async fn empty_package_collection(now_secs: i64) -> Result<Vec<u8>, CollectionError> {
    let db = ScratchDatabase::create_empty().await?;
    let failed = |e: sqlx::Error| CollectionError::QueryFailed {
        path: db.path().to_path_buf(),
        message: e.to_string(),
    };

    sqlx::raw_sql(COMMON_TABLES).execute(db.pool()).await.map_err(failed)?;
    sqlx::raw_sql(LEGACY_TABLES).execute(db.pool()).await.map_err(failed)?;
    sqlx::query(
        r#"
        INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
        VALUES (1, ?, ?, ?, 11, 0, 0, 0, ?, ?, ?, ?, '{}')
        "#,
    )
    .bind(now_secs)
    .bind(now_secs * 1000)
    .bind(now_secs * 1000)
    .bind(collection_conf().to_string())
    .bind(basic_model(now_secs).to_string())
    .bind(default_deck(now_secs).to_string())
    .bind(default_deck_config(now_secs).to_string())
    .execute(db.pool())
    .await
    .map_err(failed)?;

    db.export().await
}

fn zip_collection(collection: &[u8]) -> zip::result::ZipResult<Vec<u8>> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(COLLECTION_ENTRY, options)?;
    writer.write_all(collection)?;
    writer.start_file(MEDIA_ENTRY, options)?;
    writer.write_all(b"{}")?;
    Ok(writer.finish()?.into_inner())
}

fn package_error(path: &Path, err: impl std::fmt::Display) -> CollectionError {
    CollectionError::Package {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn collection_conf() -> serde_json::Value {
    json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "curDeck": DEFAULT_DECK_ID,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": PACKAGE_NOTE_TYPE_ID.to_string(),
        "nextPos": 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true,
    })
}

fn basic_model(now_secs: i64) -> serde_json::Value {
    let field = |name: &str, ord: i64| {
        json!({
            "name": name, "ord": ord, "sticky": false, "rtl": false,
            "font": "Arial", "size": 20, "media": [],
        })
    };
    json!({
        PACKAGE_NOTE_TYPE_ID.to_string(): {
            "id": PACKAGE_NOTE_TYPE_ID,
            "name": "Basic Model",
            "type": 0,
            "mod": now_secs,
            "usn": -1,
            "sortf": 0,
            "did": DEFAULT_DECK_ID,
            "tags": [],
            "vers": [],
            "req": [[0, "all", [0]]],
            "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
            "latexPost": "\\end{document}",
            "css": ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n",
            "flds": [field("Question", 0), field("Answer", 1)],
            "tmpls": [{
                "name": "Card 1",
                "ord": 0,
                "qfmt": "{{Question}}",
                "afmt": "{{FrontSide}}<hr id=\"answer\">{{Answer}}",
                "did": null,
                "bqfmt": "",
                "bafmt": "",
            }],
        }
    })
}

fn default_deck(now_secs: i64) -> serde_json::Value {
    json!({
        DEFAULT_DECK_ID.to_string(): {
            "id": DEFAULT_DECK_ID,
            "name": "Default",
            "mod": now_secs,
            "usn": 0,
            "dyn": 0,
            "conf": 1,
            "desc": "",
            "collapsed": false,
            "browserCollapsed": false,
            "newToday": [0, 0],
            "revToday": [0, 0],
            "lrnToday": [0, 0],
            "timeToday": [0, 0],
            "extendNew": 10,
            "extendRev": 50,
        }
    })
}

fn default_deck_config(now_secs: i64) -> serde_json::Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": now_secs,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "delays": [1, 10], "ints": [1, 4, 7], "initialFactor": 2500,
                "order": 1, "perDay": 20, "bury": true, "separate": true,
            },
            "lapse": {
                "delays": [10], "mult": 0, "minInt": 1, "leechFails": 8, "leechAction": 0,
            },
            "rev": {
                "perDay": 100, "ease4": 1.3, "fuzz": 0.05, "maxIvl": 36500,
                "bury": true, "minSpace": 1,
            },
        }
    })
}
