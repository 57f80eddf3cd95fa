//! Configuration file handling.
//!
//! The configuration file is stored at `$EXPENSE_HOME/config.json`. It selects the model provider
//! and models, the OCR strategies and the per-stage limits. API keys are never stored in it; it
//! only names the environment variable that holds the key.

use crate::db::Db;
use crate::llm::Provider;
use crate::pipeline::{StageSettings, StrategyKind, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_STAGE_TIMEOUT};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "expense";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const EXPENSE_SQLITE: &str = "expense.sqlite";
const DEFAULT_OWNER: &str = "default";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$EXPENSE_HOME` and from there it loads `$EXPENSE_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, an initial `config.json` for `provider` and an empty database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the data directory, e.g. `$HOME/expense`
    /// - `provider` - The model provider to configure defaults for
    /// - `model` - Overrides the provider's default text model
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if a config already exists in `dir`.
    pub async fn create(
        dir: impl Into<PathBuf>,
        provider: Provider,
        model: Option<String>,
    ) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the expense home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!("A config file already exists at '{}'", config_path.display());
        }
        let mut config_file = ConfigFile::for_provider(provider);
        if let Some(model) = model {
            config_file.model = model;
        }
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(EXPENSE_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// Validates that `expense_home` and its config file exist, loads the config and opens the
    /// database.
    pub async fn load(expense_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = expense_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The expense home directory is missing, run 'expense init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = root.join(EXPENSE_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn provider(&self) -> Provider {
        self.config_file.provider
    }

    /// The configured base URL, or the provider's default. Always ends with a slash so that
    /// endpoint paths can be joined onto it.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .config_file
            .base_url
            .as_deref()
            .unwrap_or(self.config_file.provider.default_base_url());
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&with_slash).with_context(|| format!("Invalid base_url '{raw}' in config"))
    }

    pub fn model(&self) -> &str {
        &self.config_file.model
    }

    pub fn vision_model(&self) -> &str {
        &self.config_file.vision_model
    }

    pub fn api_key_env(&self) -> &str {
        &self.config_file.api_key_env
    }

    /// Reads the API key from the environment variable named in the config.
    pub fn api_key(&self) -> Result<String> {
        let name = self.api_key_env();
        match std::env::var(name) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => bail!("The API key is missing, set the {name} environment variable"),
        }
    }

    pub fn owner(&self) -> &str {
        &self.config_file.owner
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.stage_timeout_secs)
    }

    pub fn max_image_bytes(&self) -> usize {
        self.config_file.max_image_bytes
    }

    pub fn ocr_strategies(&self) -> &[StrategyKind] {
        &self.config_file.ocr_strategies
    }

    /// The `tesseract` program. A bare name is looked up on `PATH`.
    pub fn tesseract_path(&self) -> &Path {
        &self.config_file.tesseract_path
    }

    pub fn extraction(&self) -> StageSettings {
        self.config_file.extraction
    }

    pub fn normalization(&self) -> StageSettings {
        self.config_file.normalization
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "expense",
///   "config_version": 1,
///   "provider": "gemini",
///   "model": "gemini-2.5-flash",
///   "vision_model": "gemini-2.5-flash",
///   "api_key_env": "GEMINI_API_KEY",
///   "owner": "default",
///   "stage_timeout_secs": 20,
///   "max_image_bytes": 10485760,
///   "ocr_strategies": ["tesseract", "vision"],
///   "tesseract_path": "tesseract",
///   "extraction": { "temperature": 0.3, "max_tokens": 256 },
///   "normalization": { "temperature": 0.2, "max_tokens": 256 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "expense"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    provider: Provider,

    /// Overrides the provider's API base URL, e.g. for a proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,

    /// The model used for extraction and normalization
    model: String,

    /// The model used to read receipt images
    vision_model: String,

    /// The environment variable that holds the API key
    api_key_env: String,

    /// Owner recorded on every saved expense
    #[serde(default = "default_owner")]
    owner: String,

    #[serde(default = "default_stage_timeout_secs")]
    stage_timeout_secs: u64,

    #[serde(default = "default_max_image_bytes")]
    max_image_bytes: usize,

    /// OCR strategies in the order they are tried
    #[serde(default = "StrategyKind::default_order")]
    ocr_strategies: Vec<StrategyKind>,

    #[serde(default = "default_tesseract_path")]
    tesseract_path: PathBuf,

    #[serde(default = "default_extraction")]
    extraction: StageSettings,

    #[serde(default = "default_normalization")]
    normalization: StageSettings,
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

fn default_stage_timeout_secs() -> u64 {
    DEFAULT_STAGE_TIMEOUT.as_secs()
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_tesseract_path() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_extraction() -> StageSettings {
    StageSettings::EXTRACTION
}

fn default_normalization() -> StageSettings {
    StageSettings::NORMALIZATION
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

impl ConfigFile {
    fn for_provider(provider: Provider) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            provider,
            base_url: None,
            model: provider.default_model().to_string(),
            vision_model: provider.default_vision_model().to_string(),
            api_key_env: provider.default_api_key_env().to_string(),
            owner: default_owner(),
            stage_timeout_secs: default_stage_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
            ocr_strategies: StrategyKind::default_order(),
            tesseract_path: default_tesseract_path(),
            extraction: default_extraction(),
            normalization: default_normalization(),
        }
    }

    /// Loads a ConfigFile from `path` and checks that it belongs to this app.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "Config file version {} is newer than this program supports ({})",
            config.config_version,
            CONFIG_VERSION
        );
        anyhow::ensure!(
            config.stage_timeout_secs > 0,
            "stage_timeout_secs must be greater than zero"
        );
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}
