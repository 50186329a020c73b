//! Layered configuration
//!
//! Priority (highest first):
//! 1. CLI arguments (`Overrides`)
//! 2. Environment variables (`TOUCHFEEL_*`)
//! 3. TOML file (`~/.config/touchfeel/config.toml` or `--config`)
//! 4. Defaults
//!
//! ```toml
//! [canvas]
//! width = 1024
//! height = 768
//!
//! [classifier]
//! backend = "http"          # or "offline"
//! url = "http://localhost:11434"
//! model = "llama3.2"
//! timeout_secs = 30
//!
//! [session]
//! classify_every = 10
//! message_display_ms = 5000
//! seed = 42
//!
//! [journal]
//! dir = "/var/lib/touchfeel/emotion-logs"
//!
//! [profile]
//! nickname = "mochi"
//! birth_month = "2024-01"
//! gender = "girl"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::render::Viewport;
use crate::types::UserProfile;
use crate::{CLASSIFY_EVERY, MESSAGE_DISPLAY_MS};

pub const ENV_PREFIX: &str = "TOUCHFEEL_";
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Where the effective configuration last came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    Cli,
    Env,
    File,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML SHAPE
// =============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasToml {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierToml {
    pub backend: Option<ClassifierBackend>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    pub classify_every: Option<u32>,
    pub message_display_ms: Option<u64>,
    pub seed: Option<u64>,
    pub addr: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalToml {
    pub dir: Option<PathBuf>,
    /// `false` turns journaling off
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileToml {
    pub nickname: Option<String>,
    pub birth_month: Option<String>,
    pub gender: Option<String>,
}

/// Top-level TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchfeelToml {
    pub canvas: CanvasToml,
    pub classifier: ClassifierToml,
    pub session: SessionToml,
    pub journal: JournalToml,
    pub profile: ProfileToml,
}

// =============================================================================
// EFFECTIVE CONFIG
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Model endpoint
    Http,
    /// Local rule table
    Offline,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierSettings {
    pub backend: ClassifierBackend,
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::Http,
            url: DEFAULT_CLASSIFIER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TouchfeelConfig {
    pub viewport: Viewport,
    pub classifier: ClassifierSettings,
    pub classify_every: u32,
    pub message_display: Duration,
    pub seed: Option<u64>,
    pub addr: String,
    /// `None` disables the journal
    pub journal_dir: Option<PathBuf>,
    pub profile: UserProfile,
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for TouchfeelConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            classifier: ClassifierSettings::default(),
            classify_every: CLASSIFY_EVERY,
            message_display: Duration::from_millis(MESSAGE_DISPLAY_MS),
            seed: None,
            addr: DEFAULT_ADDR.to_string(),
            journal_dir: default_journal_dir(),
            profile: UserProfile::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl TouchfeelConfig {
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.viewport.width > 0.0 && self.viewport.height > 0.0) {
            return Err(ConfigError::Validation(format!(
                "canvas size must be positive, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if self.classify_every == 0 {
            return Err(ConfigError::Validation("classify_every must be at least 1".into()));
        }
        if self.classifier.backend == ClassifierBackend::Http {
            if self.classifier.url.trim().is_empty() {
                return Err(ConfigError::Validation("classifier url is empty".into()));
            }
            if self.classifier.timeout.is_zero() {
                return Err(ConfigError::Validation("classifier timeout must be non-zero".into()));
            }
        }
        Ok(())
    }
}

/// CLI values; `None` leaves the lower layers alone
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub classifier_url: Option<String>,
    pub model: Option<String>,
    pub offline: bool,
    pub classify_every: Option<u32>,
    pub seed: Option<u64>,
    pub addr: Option<String>,
    pub journal_dir: Option<PathBuf>,
    pub no_journal: bool,
    pub nickname: Option<String>,
    pub birth_month: Option<String>,
    pub gender: Option<String>,
}

// =============================================================================
// LOADING
// =============================================================================

/// `$XDG_CONFIG_HOME/touchfeel/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("touchfeel").join("config.toml"))
}

/// `$XDG_DATA_HOME/touchfeel/emotion-logs`
pub fn default_journal_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("touchfeel").join("emotion-logs"))
}

/// Defaults, then `path` (if it exists), then the process environment
pub fn load_config(path: Option<&Path>) -> Result<TouchfeelConfig, ConfigError> {
    let default_path = default_config_path();
    let path = path.or(default_path.as_deref());
    let mut config = TouchfeelConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
                path: config_path.to_path_buf(),
                source: e,
            })?;
            let file: TouchfeelToml = toml::from_str(&content)?;
            apply_toml_config(&mut config, &file);
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;
            tracing::info!(path = %config_path.display(), "loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Apply TOML values over `config`
pub fn apply_toml_config(config: &mut TouchfeelConfig, toml: &TouchfeelToml) {
    if let Some(width) = toml.canvas.width {
        config.viewport.width = width;
    }
    if let Some(height) = toml.canvas.height {
        config.viewport.height = height;
    }

    if let Some(backend) = toml.classifier.backend {
        config.classifier.backend = backend;
    }
    if let Some(url) = &toml.classifier.url {
        config.classifier.url = url.clone();
    }
    if let Some(model) = &toml.classifier.model {
        config.classifier.model = model.clone();
    }
    if let Some(secs) = toml.classifier.timeout_secs {
        config.classifier.timeout = Duration::from_secs(secs);
    }

    if let Some(every) = toml.session.classify_every {
        config.classify_every = every;
    }
    if let Some(ms) = toml.session.message_display_ms {
        config.message_display = Duration::from_millis(ms);
    }
    if toml.session.seed.is_some() {
        config.seed = toml.session.seed;
    }
    if let Some(addr) = &toml.session.addr {
        config.addr = addr.clone();
    }

    if let Some(dir) = &toml.journal.dir {
        config.journal_dir = Some(dir.clone());
    }
    if toml.journal.enabled == Some(false) {
        config.journal_dir = None;
    }

    config.profile = UserProfile::new(
        toml.profile.nickname.clone(),
        toml.profile.birth_month.clone(),
        toml.profile.gender.clone(),
    )
    .or(config.profile.clone());
}

/// Apply `TOUCHFEEL_*` values looked up through `var`
pub fn apply_env_config<F>(config: &mut TouchfeelConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| var(&format!("{}{}", ENV_PREFIX, name));
    let mut touched = false;

    if let Some(w) = get("WIDTH").and_then(|v| v.parse().ok()) {
        config.viewport.width = w;
        touched = true;
    }
    if let Some(h) = get("HEIGHT").and_then(|v| v.parse().ok()) {
        config.viewport.height = h;
        touched = true;
    }
    if let Some(url) = get("CLASSIFIER_URL") {
        config.classifier.url = url;
        touched = true;
    }
    if let Some(model) = get("MODEL") {
        config.classifier.model = model;
        touched = true;
    }
    if let Some(offline) = get("OFFLINE") {
        if offline != "0" && !offline.eq_ignore_ascii_case("false") {
            config.classifier.backend = ClassifierBackend::Offline;
        }
        touched = true;
    }
    if let Some(secs) = get("CLASSIFIER_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.classifier.timeout = Duration::from_secs(secs);
        touched = true;
    }
    if let Some(every) = get("CLASSIFY_EVERY").and_then(|v| v.parse().ok()) {
        config.classify_every = every;
        touched = true;
    }
    if let Some(seed) = get("SEED").and_then(|v| v.parse().ok()) {
        config.seed = Some(seed);
        touched = true;
    }
    if let Some(addr) = get("ADDR") {
        config.addr = addr;
        touched = true;
    }
    if let Some(dir) = get("JOURNAL_DIR") {
        config.journal_dir = if dir.is_empty() { None } else { Some(PathBuf::from(dir)) };
        touched = true;
    }

    let profile = UserProfile::new(get("NICKNAME"), get("BIRTH_MONTH"), get("GENDER"));
    if profile != UserProfile::default() {
        config.profile = profile.or(config.profile.clone());
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

/// Apply CLI values over everything else
pub fn apply_overrides(config: &mut TouchfeelConfig, cli: &Overrides) {
    let mut touched = false;

    if let Some(w) = cli.width {
        config.viewport.width = w;
        touched = true;
    }
    if let Some(h) = cli.height {
        config.viewport.height = h;
        touched = true;
    }
    if let Some(url) = &cli.classifier_url {
        config.classifier.url = url.clone();
        config.classifier.backend = ClassifierBackend::Http;
        touched = true;
    }
    if let Some(model) = &cli.model {
        config.classifier.model = model.clone();
        touched = true;
    }
    if cli.offline {
        config.classifier.backend = ClassifierBackend::Offline;
        touched = true;
    }
    if let Some(every) = cli.classify_every {
        config.classify_every = every;
        touched = true;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
        touched = true;
    }
    if let Some(addr) = &cli.addr {
        config.addr = addr.clone();
        touched = true;
    }
    if let Some(dir) = &cli.journal_dir {
        config.journal_dir = Some(dir.clone());
        touched = true;
    }
    if cli.no_journal {
        config.journal_dir = None;
        touched = true;
    }

    let profile = UserProfile::new(cli.nickname.clone(), cli.birth_month.clone(), cli.gender.clone());
    if profile != UserProfile::default() {
        config.profile = profile.or(config.profile.clone());
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Cli;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = TouchfeelConfig::default();
        assert_eq!(config.viewport, Viewport::new(1024.0, 768.0));
        assert_eq!(config.classify_every, 10);
        assert_eq!(config.message_display, Duration::from_millis(5000));
        assert_eq!(config.classifier.backend, ClassifierBackend::Http);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file_is_applied() {
        let (_dir, path) = write_config(
            r#"
            [canvas]
            width = 800
            height = 600

            [classifier]
            backend = "offline"
            model = "tiny"

            [session]
            classify_every = 4
            seed = 9

            [journal]
            enabled = false

            [profile]
            nickname = "mochi"
            "#,
        );

        let mut config = TouchfeelConfig::default();
        let file: TouchfeelToml = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        apply_toml_config(&mut config, &file);

        assert_eq!(config.viewport, Viewport::new(800.0, 600.0));
        assert_eq!(config.classifier.backend, ClassifierBackend::Offline);
        assert_eq!(config.classifier.model, "tiny");
        assert_eq!(config.classify_every, 4);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.journal_dir, None);
        assert_eq!(config.profile.nickname.as_deref(), Some("mochi"));
    }

    #[test]
    fn test_load_config_reads_explicit_path() {
        let (_dir, path) = write_config("[session]\nmessage_display_ms = 1500\n");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.message_display, Duration::from_millis(1500));
        assert_eq!(config.config_file_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let (_dir, path) = write_config("[canvas\nwidth = ");
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = TouchfeelConfig::default();
        let file: TouchfeelToml = toml::from_str("[classifier]\nmodel = \"from-file\"\n").unwrap();
        apply_toml_config(&mut config, &file);

        apply_env_config(
            &mut config,
            env(&[
                ("TOUCHFEEL_MODEL", "from-env"),
                ("TOUCHFEEL_OFFLINE", "1"),
                ("TOUCHFEEL_NICKNAME", "kai"),
                ("TOUCHFEEL_JOURNAL_DIR", ""),
            ]),
        );

        assert_eq!(config.classifier.model, "from-env");
        assert_eq!(config.classifier.backend, ClassifierBackend::Offline);
        assert_eq!(config.profile.nickname.as_deref(), Some("kai"));
        assert_eq!(config.journal_dir, None);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let mut config = TouchfeelConfig::default();
        apply_env_config(&mut config, env(&[("TOUCHFEEL_CLASSIFY_EVERY", "lots")]));
        assert_eq!(config.classify_every, 10);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = TouchfeelConfig::default();
        apply_env_config(&mut config, env(&[("TOUCHFEEL_CLASSIFY_EVERY", "3"), ("TOUCHFEEL_GENDER", "boy")]));

        apply_overrides(
            &mut config,
            &Overrides {
                classify_every: Some(7),
                nickname: Some("rio".into()),
                offline: true,
                ..Default::default()
            },
        );

        assert_eq!(config.classify_every, 7);
        assert_eq!(config.classifier.backend, ClassifierBackend::Offline);
        // CLI nickname merges with env gender
        assert_eq!(config.profile, UserProfile::new(Some("rio".into()), None, Some("boy".into())));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = TouchfeelConfig::default();
        apply_overrides(&mut config, &Overrides::default());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation() {
        let mut config = TouchfeelConfig::default();
        config.viewport = Viewport::new(0.0, 100.0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = TouchfeelConfig::default();
        config.classify_every = 0;
        assert!(config.validate().is_err());

        let mut config = TouchfeelConfig::default();
        config.classifier.url = "  ".into();
        assert!(config.validate().is_err());
        config.classifier.backend = ClassifierBackend::Offline;
        assert!(config.validate().is_ok());
    }
}
