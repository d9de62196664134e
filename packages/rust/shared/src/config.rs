//! Application configuration for the course feedback overlay.
//!
//! User config lives at `~/.coursefeedback/coursefeedback.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CourseFeedbackError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursefeedback.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursefeedback";

// ---------------------------------------------------------------------------
// Config structs (matching coursefeedback.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feedback lookup service.
    #[serde(default)]
    pub feedback: FeedbackServiceConfig,

    /// Debounce settings.
    #[serde(default)]
    pub reconcile: ReconcileSection,

    /// Host patterns for each supported site layout.
    #[serde(default)]
    pub sites: SitesConfig,
}

/// `[feedback]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackServiceConfig {
    /// Lookup endpoint receiving the scraped rows.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedbackServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://benheim.pythonanywhere.com/get-course-feedback".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSection {
    /// Quiet period after the last mutation before a pass runs.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    1000
}

/// `[sites]` section. Patterns are matched as hostname substrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    /// Hosts serving the classic grid layout.
    #[serde(default = "default_classic_hosts")]
    pub classic_hosts: Vec<String>,

    /// Hosts serving the fluid layout.
    #[serde(default = "default_fluid_hosts")]
    pub fluid_hosts: Vec<String>,
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            classic_hosts: default_classic_hosts(),
            fluid_hosts: default_fluid_hosts(),
        }
    }
}

fn default_classic_hosts() -> Vec<String> {
    vec!["caesar.ent.northwestern.edu".into()]
}
fn default_fluid_hosts() -> Vec<String> {
    vec!["fluid.ent.northwestern.edu".into()]
}

// ---------------------------------------------------------------------------
// Reconciler config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Debounce delay between the last mutation and the pass it triggers.
    pub debounce: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ReconcilerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.reconcile.debounce_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursefeedback/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourseFeedbackError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursefeedback/coursefeedback.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CourseFeedbackError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CourseFeedbackError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourseFeedbackError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourseFeedbackError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourseFeedbackError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the feedback endpoint is an absolute http(s) URL.
pub fn validate_endpoint(config: &AppConfig) -> Result<Url> {
    let raw = &config.feedback.endpoint;
    let url = Url::parse(raw)
        .map_err(|e| CourseFeedbackError::validation(format!("invalid feedback endpoint '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CourseFeedbackError::validation(format!(
            "feedback endpoint must use http or https, got '{other}'"
        ))),
    }
}
