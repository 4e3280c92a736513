//! AnkiWeb web service client
//!
//! The browser-facing `/svc/*` endpoints take binary messages and cookie
//! authentication. Cookies are pasted into settings from a logged-in browser;
//! each host may have its own.
//!
//! The editor lives on `ankiuser.net`; when that host answers 404 the same
//! request is replayed once against the main web host.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, StatusCode};
use rememberit_core::config::{
    Settings, DEFAULT_EDITOR_BASE_URL, DEFAULT_WEB_BASE_URL, DEFAULT_WEB_NOTE_TYPE_ID,
};
use rememberit_core::domain::{DeckId, NoteId, NoteTypeId};
use rememberit_core::ports::{DeckListInfo, IWebService, NoteEdit, SearchHit};
use rememberit_core::{Phase, RememberItError};
use rememberit_proto::{
    AddOrUpdateRequest, CreateDeckRequest, DeckListInfoRequest, DeckListInfoResponse, Message,
    RemoveDeckRequest, RenameDeckRequest, SearchRequest, SearchResponse,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::exchange_log::{ExchangeLog, ExchangeRecord};
use crate::AnkiWebError;

const OCTET_STREAM: &str = "application/octet-stream";

/// Settings for a [`WebServiceClient`]
#[derive(Debug, Clone)]
pub struct WebServiceConfig {
    /// Main web host
    pub base_url: String,
    /// Editor host, tried first for add/update
    pub editor_base_url: String,
    /// Note type for new notes when the caller names none
    pub note_type_id: NoteTypeId,
    pub timeout: Duration,
    /// Source of cookies, user agent and the debug log path
    pub settings: Settings,
}

impl WebServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: DEFAULT_WEB_BASE_URL.to_string(),
            editor_base_url: DEFAULT_EDITOR_BASE_URL.to_string(),
            note_type_id: NoteTypeId::new(settings.note_type_id.unwrap_or(DEFAULT_WEB_NOTE_TYPE_ID)),
            timeout: Duration::from_secs(settings.timeouts.metadata_secs),
            settings: settings.clone(),
        }
    }

    /// Point both hosts somewhere else (tests, self-hosted mirrors)
    #[must_use]
    pub fn with_base_urls(mut self, base_url: &str, editor_base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.editor_base_url = editor_base_url.trim_end_matches('/').to_string();
        self
    }
}

/// HTTP client for the legacy web service
pub struct WebServiceClient {
    http: Client,
    config: WebServiceConfig,
    log: ExchangeLog,
}

impl WebServiceClient {
    /// Creates a client for `config`
    ///
    /// # Errors
    ///
    /// Returns `AnkiWebError::InvalidUrl` for an unparsable host and
    /// `AnkiWebError::Network` if the HTTP stack cannot be initialised.
    pub fn new(config: WebServiceConfig) -> Result<Self, AnkiWebError> {
        for base in [&config.base_url, &config.editor_base_url] {
            Url::parse(base).map_err(|e| AnkiWebError::InvalidUrl(format!("{base}: {e}")))?;
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnkiWebError::network(Phase::Query, e))?;
        let log = ExchangeLog::new(config.settings.debug_log_path());
        Ok(Self { http, config, log })
    }

    fn url(base: &str, path: &str) -> Result<Url, AnkiWebError> {
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| AnkiWebError::InvalidUrl(format!("{base}{path}: {e}")))
    }

    /// POST a binary message and return the response body
    async fn post(
        &self,
        phase: Phase,
        url: Url,
        referer: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, AnkiWebError> {
        let origin = url.origin().ascii_serialization();
        let referer = format!("{origin}{referer}");
        let cookie = url
            .host_str()
            .and_then(|host| self.config.settings.cookie_for_host(host))
            .unwrap_or_default()
            .to_string();

        let mut headers = vec![
            ("content-type", OCTET_STREAM),
            ("accept", "*/*"),
            ("user-agent", self.config.settings.user_agent()),
            ("origin", origin.as_str()),
            ("referer", referer.as_str()),
        ];
        if !cookie.is_empty() {
            headers.push(("cookie", cookie.as_str()));
        }

        let mut request = self.http.post(url.clone()).body(body.clone());
        for (name, value) in &headers {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AnkiWebError::network(phase, e))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AnkiWebError::network(phase, e))?;

        self.log.record(
            &ExchangeRecord::new("POST", url.as_str())
                .request(headers.iter().copied(), &body)
                .response(status.as_u16(), &response_headers, &bytes),
        );

        if !status.is_success() {
            warn!(%phase, status = status.as_u16(), url = %url, "Web service request failed");
            return Err(AnkiWebError::status(phase, status.as_u16()));
        }
        debug!(%phase, url = %url, size = bytes.len(), "Web service response received");
        Ok(bytes.to_vec())
    }

    async fn post_web(&self, phase: Phase, path: &str, body: Vec<u8>) -> Result<Vec<u8>, AnkiWebError> {
        let url = Self::url(&self.config.base_url, path)?;
        self.post(phase, url, "/decks", body).await
    }

    /// Fetch the deck tree
    pub async fn get_deck_list(&self, minutes_west_of_utc: i32) -> Result<DeckListInfo, AnkiWebError> {
        let body = DeckListInfoRequest {
            minutes_west_of_utc: Some(minutes_west_of_utc),
        }
        .encode();
        let response = self.post_web(Phase::Query, "/svc/decks/deck-list-info", body).await?;
        let decoded = DeckListInfoResponse::decode(&response)
            .map_err(|e| AnkiWebError::decode(Phase::Query, e))?;
        Ok(DeckListInfo {
            top_node: decoded.top_node,
            current_deck_id: decoded.current_deck_id,
            collection_size_bytes: decoded.collection_size_bytes,
            media_size_bytes: decoded.media_size_bytes,
        })
    }

    /// Run a search query
    pub async fn search_notes(&self, query: &str) -> Result<Vec<SearchHit>, AnkiWebError> {
        let body = SearchRequest {
            query: query.to_string(),
        }
        .encode();
        let response = self.post_web(Phase::Query, "/svc/search/search", body).await?;
        let decoded =
            SearchResponse::decode(&response).map_err(|e| AnkiWebError::decode(Phase::Query, e))?;
        Ok(decoded
            .results
            .into_iter()
            .filter(|hit| hit.note_id > 0)
            .map(|hit| SearchHit {
                note_id: NoteId::new(hit.note_id),
                text: hit.text,
            })
            .collect())
    }

    /// Create or update a note through the editor
    pub async fn add_or_update_note(&self, edit: &NoteEdit) -> Result<(), AnkiWebError> {
        let request = match edit.note_id {
            Some(note_id) => AddOrUpdateRequest::update(&edit.front, &edit.back, &edit.tags, note_id.as_i64()),
            None => {
                let deck_id = edit.deck_id.ok_or_else(|| {
                    AnkiWebError::InvalidRequest("creating a note requires a deck id".to_string())
                })?;
                let note_type = edit.note_type_id.unwrap_or(self.config.note_type_id);
                AddOrUpdateRequest::create(
                    &edit.front,
                    &edit.back,
                    &edit.tags,
                    note_type.as_i64(),
                    deck_id.as_i64(),
                )
            }
        };
        request.validate().map_err(AnkiWebError::InvalidRequest)?;
        let body = request.encode();
        let referer = match edit.note_id {
            Some(note_id) => format!("/edit/{note_id}"),
            None => "/add".to_string(),
        };

        let primary = Self::url(&self.config.editor_base_url, "/svc/editor/add-or-update")?;
        match self.post(Phase::Mutate, primary, &referer, body.clone()).await {
            Err(AnkiWebError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                info!(fallback = %self.config.base_url, "Editor host returned 404, retrying on web host");
                let fallback = Self::url(&self.config.base_url, "/svc/editor/add-or-update")?;
                self.post(Phase::Mutate, fallback, &referer, body).await?;
            }
            other => {
                other?;
            }
        }
        debug!(note_id = ?edit.note_id, "Note saved through editor");
        Ok(())
    }

    pub async fn create_deck_named(&self, name: &str) -> Result<(), AnkiWebError> {
        let body = CreateDeckRequest {
            name: name.to_string(),
        }
        .encode();
        self.post_web(Phase::Mutate, "/svc/decks/create-deck", body).await?;
        info!(name, "Created deck through web service");
        Ok(())
    }

    pub async fn rename_deck_to(&self, deck_id: DeckId, name: &str) -> Result<(), AnkiWebError> {
        let body = RenameDeckRequest {
            deck_id: deck_id.as_i64(),
            name: name.to_string(),
        }
        .encode();
        self.post_web(Phase::Mutate, "/svc/decks/rename-deck", body).await?;
        info!(deck_id = %deck_id, name, "Renamed deck through web service");
        Ok(())
    }

    pub async fn remove_deck_by_id(&self, deck_id: DeckId) -> Result<(), AnkiWebError> {
        let body = RemoveDeckRequest {
            deck_id: deck_id.as_i64(),
        }
        .encode();
        self.post_web(Phase::Mutate, "/svc/decks/remove-deck", body).await?;
        info!(deck_id = %deck_id, "Removed deck through web service");
        Ok(())
    }
}

/// Minutes west of UTC for the local time zone
pub fn local_minutes_west_of_utc() -> i32 {
    -(Local::now().offset().local_minus_utc() / 60)
}

#[async_trait]
impl IWebService for WebServiceClient {
    async fn deck_list(&self, minutes_west_of_utc: i32) -> Result<DeckListInfo, RememberItError> {
        Ok(self.get_deck_list(minutes_west_of_utc).await?)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RememberItError> {
        Ok(self.search_notes(query).await?)
    }

    async fn add_or_update(&self, edit: &NoteEdit) -> Result<(), RememberItError> {
        Ok(self.add_or_update_note(edit).await?)
    }

    async fn create_deck(&self, name: &str) -> Result<(), RememberItError> {
        Ok(self.create_deck_named(name).await?)
    }

    async fn rename_deck(&self, deck_id: DeckId, name: &str) -> Result<(), RememberItError> {
        Ok(self.rename_deck_to(deck_id, name).await?)
    }

    async fn remove_deck(&self, deck_id: DeckId) -> Result<(), RememberItError> {
        Ok(self.remove_deck_by_id(deck_id).await?)
    }

    fn edit_base_url(&self) -> String {
        self.config.editor_base_url.clone()
    }
}
