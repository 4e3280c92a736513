//! RememberIt Proto - wire codecs for the AnkiWeb protocols
//!
//! - [`messages`] - binary messages of the web service, on a hand-written
//!   protocol-buffer [`wire`] codec
//! - [`envelope`] - compressed JSON bodies of the sync protocol with
//!   multi-strategy response decoding
//! - [`header`] - the per-request `anki-sync` header

pub mod envelope;
pub mod error;
pub mod header;
pub mod messages;
pub mod wire;

pub use envelope::{decompress_collection, Compression, EnvelopeCodec, SQLITE_MAGIC, ZSTD_MAGIC};
pub use error::{ProtoError, ProtoResult};
pub use header::{client_version, SyncHeader, SYNC_HEADER_NAME, SYNC_VERSION};
pub use messages::{
    AddOrUpdateRequest, CreateDeckRequest, DeckListInfoRequest, DeckListInfoResponse, Message,
    ModelSelection, RemoveDeckRequest, RenameDeckRequest, SearchRequest, SearchResponse,
    SearchResult,
};
