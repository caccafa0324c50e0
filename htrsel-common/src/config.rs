//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`HTRSEL_ROOT_FOLDER`, then `HTRSEL_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unparsable TOML file never stops startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HTRSEL_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "htrsel.db";

/// Media directory name inside the root folder
pub const MEDIA_DIR: &str = "media";

/// Default padding (pixels) passed to segmentation models
pub const DEFAULT_PADDING: u32 = 10;

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub bind: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    CompiledDefaults::for_current_platform().log_level
}

/// One external line-segmentation model
///
/// `command` is an argv template. Placeholders: `{image}`, `{output_dir}`,
/// `{prefix}`, `{model}`, `{model_file}`, `{padding}`, `{ext}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub model_file: String,
    #[serde(default = "default_model_command")]
    pub command: Vec<String>,
}

fn default_model_command() -> Vec<String> {
    [
        "htr-segment",
        "{image}",
        "{output_dir}",
        "--model",
        "{model_file}",
        "--prefix",
        "{prefix}",
        "--padding",
        "{padding}",
        "--ext",
        "{ext}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            name: "blla".to_string(),
            model_file: "blla.mlmodel".to_string(),
            command: default_model_command(),
        },
        ModelConfig {
            name: "muharaf".to_string(),
            model_file: "muharaf_seg_best.mlmodel".to_string(),
            command: default_model_command(),
        },
    ]
}

/// Interactive (GUI) segmenter launched fire-and-forget per document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractiveConfig {
    /// Program to execute (e.g. a virtualenv python)
    pub program: String,
    /// Arguments placed before the document path
    #[serde(default)]
    pub args: Vec<String>,
    /// Virtualenv root whose `bin` directory is prepended to PATH
    pub venv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentationConfig {
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default)]
    pub interactive: Option<InteractiveConfig>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            padding: DEFAULT_PADDING,
            interactive: None,
        }
    }
}

fn default_padding() -> u32 {
    DEFAULT_PADDING
}

impl SegmentationConfig {
    /// Look up a configured model by name
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// Remote sync of validated folders (rsync)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// rsync destination, e.g. `host:/opt/transcription/media`
    pub target: Option<String>,
}

/// Notebook rasterisation
///
/// `rasterize_command` placeholders: `{pdf}`, `{output_prefix}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotebookConfig {
    #[serde(default = "default_rasterize_command")]
    pub rasterize_command: Option<Vec<String>>,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            rasterize_command: default_rasterize_command(),
        }
    }
}

fn default_rasterize_command() -> Option<Vec<String>> {
    Some(
        ["pdftoppm", "-png", "-r", "300", "{pdf}", "{output_prefix}"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

/// Symbol replacement applied to transcriptions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolPair {
    pub from: String,
    pub to: String,
}

fn default_symbols() -> Vec<SymbolPair> {
    // Right-to-left arrows
    vec![
        SymbolPair {
            from: "->".to_string(),
            to: "←".to_string(),
        },
        SymbolPair {
            from: ">-".to_string(),
            to: "→".to_string(),
        },
    ]
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub bind: Option<String>,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notebook: NotebookConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolPair>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            logging: LoggingConfig::default(),
            bind: None,
            segmentation: SegmentationConfig::default(),
            sync: SyncConfig::default(),
            notebook: NotebookConfig::default(),
            symbols: default_symbols(),
        }
    }
}

/// Where the running configuration came from
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// A file was found but could not be read or parsed
    Rejected(PathBuf, Error),
    Defaults,
}

impl ConfigSource {
    /// Report the outcome once logging is up
    pub fn log(&self) {
        match self {
            Self::File(path) => info!("Loaded configuration from {}", path.display()),
            Self::Rejected(path, e) => warn!("Ignoring config file {}: {}", path.display(), e),
            Self::Defaults => info!("No config file found, using compiled defaults"),
        }
    }
}

impl TomlConfig {
    /// Load the config file, falling back to defaults on any problem
    ///
    /// Runs before the tracing subscriber exists (the file sets the log
    /// level), so the outcome is returned rather than logged.
    pub fn load_or_default() -> (Self, ConfigSource) {
        match locate_config_file() {
            Some(path) => match load_toml_config(&path) {
                Ok(config) => (config, ConfigSource::File(path)),
                Err(e) => (Self::default(), ConfigSource::Rejected(path, e)),
            },
            None => (Self::default(), ConfigSource::Defaults),
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Find the config file: `HTRSEL_CONFIG`, then the user config dir, then /etc
pub fn locate_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points to missing file {}", CONFIG_ENV_VAR, path.display());
        return None;
    }

    let user_config = dirs::config_dir().map(|d| d.join("htrsel").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/htrsel/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("htrsel"))
        .unwrap_or_else(|| PathBuf::from("./htrsel_data"))
}

/// Resolves the root folder from CLI, environment, TOML and defaults
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] Root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        for var in ["HTRSEL_ROOT_FOLDER", "HTRSEL_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    info!("[{}] Root folder from {}: {}", self.module_name, var, path);
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = &self.toml_root {
            info!("[{}] Root folder from config file: {}", self.module_name, path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!("[{}] Root folder (compiled default): {}", self.module_name, path.display());
        path
    }
}

/// Creates the root folder layout and hands out derived paths
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root and media directories (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.media_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root_folder.join(MEDIA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_two_models() {
        let config = TomlConfig::default();
        let names: Vec<&str> = config
            .segmentation
            .models
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["blla", "muharaf"]);
        assert_eq!(config.segmentation.padding, 10);
        assert!(config.sync.target.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:9000"

            [sync]
            target = "bol:/opt/transcription/media"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(config.sync.target.as_deref(), Some("bol:/opt/transcription/media"));
        assert_eq!(config.segmentation.models.len(), 2);
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn model_lookup_by_name() {
        let seg = SegmentationConfig::default();
        assert_eq!(seg.model("muharaf").unwrap().model_file, "muharaf_seg_best.mlmodel");
        assert!(seg.model("bbox").is_none());
    }
}
