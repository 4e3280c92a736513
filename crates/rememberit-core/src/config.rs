//! Persisted settings for RememberIt.
//!
//! Settings live in a JSON file, by default `~/.rememberit/settings.json`
//! (or `$REMEMBERIT_CONFIG_DIR/settings.json`). The local copy of the
//! collection database is kept in the same directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::RememberItError;
use crate::domain::session::{normalize_endpoint, Session};

/// Environment variable overriding the configuration directory.
pub const ENV_CONFIG_DIR: &str = "REMEMBERIT_CONFIG_DIR";

const DEFAULT_CONFIG_DIRNAME: &str = ".rememberit";
const DEFAULT_CONFIG_FILENAME: &str = "settings.json";
const COLLECTION_FILENAME: &str = "collection.anki2";

/// Sync service endpoint used when none is configured.
pub const DEFAULT_SYNC_ENDPOINT: &str = "https://sync.ankiweb.net/";

/// Base URL of the legacy web service.
pub const DEFAULT_WEB_BASE_URL: &str = "https://ankiweb.net";

/// Host serving the legacy note editor.
pub const DEFAULT_EDITOR_BASE_URL: &str = "https://ankiuser.net";

/// Note type used by the web service when none is configured.
pub const DEFAULT_WEB_NOTE_TYPE_ID: i64 = 1_763_445_109_221;

/// User agent sent to the legacy web service when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Which sync strategy the orchestrator uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Full download, local SQLite mutation, full upload.
    #[default]
    CollectionSwap,
    /// Legacy cookie-authenticated `/svc/*` endpoints.
    WebService,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::CollectionSwap => write!(f, "collection_swap"),
            StrategyKind::WebService => write!(f, "web_service"),
        }
    }
}

/// Per-call network timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Host key, deck list, search and edit calls.
    pub metadata_secs: u64,
    /// Full collection download and upload.
    pub transfer_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            metadata_secs: 15,
            transfer_secs: 600,
        }
    }
}

/// Top-level settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub email: String,
    pub password: String,
    /// Session key from the last successful login; empty when logged out.
    pub sync_key: String,
    /// Sync service endpoint.
    pub endpoint: String,
    /// User agent override for the web service.
    pub user_agent: String,
    /// Raw `Cookie` header used for any host without a specific one.
    pub cookie_header: String,
    pub cookie_header_ankiweb: String,
    pub cookie_header_ankiuser: String,
    /// JSON-lines exchange log; empty disables it.
    pub debug_log_path: String,
    pub strategy: StrategyKind,
    /// Note type for newly added notes.
    pub note_type_id: Option<i64>,
    pub timeouts: TimeoutConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            sync_key: String::new(),
            endpoint: DEFAULT_SYNC_ENDPOINT.to_string(),
            user_agent: String::new(),
            cookie_header: String::new(),
            cookie_header_ankiweb: String::new(),
            cookie_header_ankiuser: String::new(),
            debug_log_path: String::new(),
            strategy: StrategyKind::default(),
            note_type_id: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Settings {
    /// Directory holding the settings file and local collection.
    pub fn config_dir() -> PathBuf {
        match std::env::var_os(ENV_CONFIG_DIR) {
            Some(dir) if !dir.is_empty() => expand_tilde(Path::new(&dir)),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(DEFAULT_CONFIG_DIRNAME),
        }
    }

    /// Default location of the settings file.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join(DEFAULT_CONFIG_FILENAME)
    }

    /// Location of the local collection copy for a settings file at `path`.
    pub fn collection_path_for(path: &Path) -> PathBuf {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_dir)
            .join(COLLECTION_FILENAME)
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields defaults; unparsable JSON is an error.
    pub fn load(path: &Path) -> Result<Self, RememberItError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| RememberItError::Store {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RememberItError::InvalidInput(format!("{}: {e}", path.display()))
        })
    }

    /// Try to load from `path`; fall back to [`Settings::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write settings as pretty JSON, restricting permissions to the owner.
    pub fn save(&self, path: &Path) -> Result<(), RememberItError> {
        let store_err = |e: std::io::Error| RememberItError::Store {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(store_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RememberItError::InvalidInput(e.to_string()))?;
        std::fs::write(path, json).map_err(store_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::debug!(path = %path.display(), error = %e, "Could not restrict settings permissions");
            }
        }
        Ok(())
    }

    /// Session stored from a previous login, if any.
    pub fn session(&self) -> Option<Session> {
        if self.sync_key.is_empty() {
            return None;
        }
        let username = (!self.email.is_empty()).then(|| self.email.clone());
        Some(Session::new(self.sync_key.clone(), &self.endpoint, username))
    }

    /// Record `session` so later runs start logged in.
    pub fn store_session(&mut self, session: &Session) {
        self.sync_key = session.hkey.clone();
        self.endpoint = session.endpoint.clone();
        if let Some(user) = &session.username {
            self.email = user.clone();
        }
    }

    /// Forget the session key; credentials are kept.
    pub fn clear_session(&mut self) {
        self.sync_key.clear();
    }

    /// Sync endpoint with a trailing slash.
    pub fn endpoint(&self) -> String {
        if self.endpoint.trim().is_empty() {
            DEFAULT_SYNC_ENDPOINT.to_string()
        } else {
            normalize_endpoint(&self.endpoint)
        }
    }

    /// User agent for the legacy web service.
    pub fn user_agent(&self) -> &str {
        if self.user_agent.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            &self.user_agent
        }
    }

    /// Cookie header for `host`, preferring a host-specific one.
    pub fn cookie_for_host(&self, host: &str) -> Option<&str> {
        let cookie = if host.ends_with("ankiuser.net") && !self.cookie_header_ankiuser.is_empty() {
            &self.cookie_header_ankiuser
        } else if host.ends_with("ankiweb.net") && !self.cookie_header_ankiweb.is_empty() {
            &self.cookie_header_ankiweb
        } else {
            &self.cookie_header
        };
        (!cookie.is_empty()).then_some(cookie.as_str())
    }

    /// Exchange log path, if enabled.
    pub fn debug_log_path(&self) -> Option<PathBuf> {
        (!self.debug_log_path.is_empty()).then(|| expand_tilde(Path::new(&self.debug_log_path)))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// A single validation error found in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"timeouts.metadata_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Settings {
    /// Validate the settings and return all errors found.
    ///
    /// An empty vector means the settings are valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.timeouts.metadata_secs == 0 {
            errors.push(ValidationError {
                field: "timeouts.metadata_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.timeouts.transfer_secs == 0 {
            errors.push(ValidationError {
                field: "timeouts.transfer_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        let endpoint = self.endpoint.trim();
        if !endpoint.is_empty()
            && !(endpoint.starts_with("https://") || endpoint.starts_with("http://"))
        {
            errors.push(ValidationError {
                field: "endpoint".into(),
                message: format!("must be an http(s) URL, got '{endpoint}'"),
            });
        }

        if let Some(id) = self.note_type_id {
            if id <= 0 {
                errors.push(ValidationError {
                    field: "note_type_id".into(),
                    message: "must be a positive id".into(),
                });
            }
        }

        errors
    }
}
