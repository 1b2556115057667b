//! Settings schema. Every field has a compiled default so a partial JSON
//! file is always valid.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::default_data_dir;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanwrightSettings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub assets: AssetSettings,
    pub generation: GenerationSettings,
    pub packaging: PackagingSettings,
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    /// Allowed CORS origins. Empty means permissive.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            request_timeout_secs: 300,
            body_limit_bytes: 10 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

/// Which repository implementation holds session records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Rows in the service's SQLite database.
    #[default]
    Sqlite,
    /// One JSON document per session on disk.
    Files,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub data_dir: String,
    pub session_backend: SessionBackend,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().into_owned(),
            session_backend: SessionBackend::default(),
        }
    }
}

impl StorageSettings {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("planwright.db")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir().join("sessions")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir().join("artifacts")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir().join("packages")
    }
}

/// Location of persona, template and checklist markdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetSettings {
    pub root: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            root: "assets".into(),
        }
    }
}

/// Language-model backend. The API key is deliberately absent: it is read
/// from the environment at startup and never written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            timeout_secs: 120,
            max_output_tokens: 8192,
            temperature: 0.7,
        }
    }
}

/// Archive retention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackagingSettings {
    /// How long an archive survives after its first download.
    pub download_retention_secs: u64,
    /// How long an archive survives if nobody downloads it.
    pub unclaimed_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PackagingSettings {
    fn default() -> Self {
        Self {
            download_retention_secs: 60,
            unclaimed_ttl_secs: 3600,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-target level overrides, e.g. `{"planwright_llm": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
