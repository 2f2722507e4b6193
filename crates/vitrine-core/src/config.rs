use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VitrineError};

/// Top-level configuration for the Vitrine application.
///
/// Loaded from `~/.vitrine/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitrineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub forms: FormsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for VitrineConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            catalog: CatalogConfig::default(),
            forms: FormsConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl VitrineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VitrineConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.search.top_k == 0 {
            return Err(VitrineError::Config(
                "search.top_k must be positive".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(VitrineError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Search pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of nearest neighbours requested per query. Must be positive.
    pub top_k: usize,
    /// Upper bound on query encoding, in milliseconds.
    pub embed_timeout_ms: u64,
    /// Upper bound on the index lookup, in milliseconds.
    pub index_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            embed_timeout_ms: 5_000,
            index_timeout_ms: 2_000,
        }
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend: "onnx" or "mock".
    pub backend: String,
    /// Path to the ONNX model file.
    pub model_path: String,
    /// Path to the tokenizer definition.
    pub tokenizer_path: String,
    /// Embedding dimension.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "onnx".to_string(),
            model_path: "models/model.onnx".to_string(),
            tokenizer_path: "models/tokenizer.json".to_string(),
            dimensions: 384,
        }
    }
}

/// Catalog source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the catalog CSV file.
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "catalog.csv".to_string(),
        }
    }
}

/// Problem report handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsConfig {
    /// Path to the CSV file problem reports are appended to.
    pub reports_path: String,
    /// Conversation notified about new reports. None disables notification.
    pub notify_chat: Option<String>,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            reports_path: "reports.csv".to_string(),
            notify_chat: None,
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listen port. 0 means unset, letting the CLI resolution pick one.
    pub port: u16,
    /// Bind address.
    pub bind: String,
    /// Per-second request ceiling on message endpoints.
    pub max_requests_per_sec: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 0,
            bind: "127.0.0.1".to_string(),
            max_requests_per_sec: 10,
        }
    }
}
