use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub import: ImportConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub dir: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stable_duration_ms")]
    pub stable_duration_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_max_registry_entries")]
    pub max_registry_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub destination_root: PathBuf,
    /// Scratch directory for converted intermediates. Defaults to `{destination_root}/.work`.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_author")]
    pub default_author: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertConfig {
    #[serde(default)]
    pub calibre_path: Option<PathBuf>,
    #[serde(default)]
    pub pdftoppm_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
    #[serde(default = "default_max_chapters")]
    pub max_chapters: usize,
    /// Used when the settings store has no `auto_convert_txt` row.
    #[serde(default = "default_true")]
    pub auto_convert_txt: bool,
    /// Used when the settings store has no `auto_convert_mobi` row.
    #[serde(default = "default_true")]
    pub auto_convert_mobi: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_stable_duration_ms() -> u64 {
    3_000
}

fn default_extensions() -> Vec<String> {
    [".epub", ".pdf", ".txt", ".mobi", ".azw3"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_registry_entries() -> usize {
    10_000
}

fn default_max_concurrent() -> usize {
    2
}

fn default_author() -> String {
    "Unknown".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_output_bytes() -> u64 {
    1024 * 1024
}

fn default_max_chapters() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> String {
    "dropshelf.db".to_string()
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            calibre_path: None,
            pdftoppm_path: None,
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            max_chapters: default_max_chapters(),
            auto_convert_txt: true,
            auto_convert_mobi: true,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl WatchConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval_ms: default_poll_interval_ms(),
            stable_duration_ms: default_stable_duration_ms(),
            extensions: default_extensions(),
            ignore_patterns: Vec::new(),
            max_registry_entries: default_max_registry_entries(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stable_duration(&self) -> Duration {
        Duration::from_millis(self.stable_duration_ms)
    }

    /// Allowed extensions normalized to lowercase, dot-qualified form.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase()))
            .collect()
    }
}

impl ImportConfig {
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            work_dir: None,
            max_concurrent: default_max_concurrent(),
            default_author: default_author(),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.destination_root.join(".work"))
    }
}

impl ConvertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Minimal configuration for a watched directory and a destination root.
    pub fn new(watch_dir: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            watch: WatchConfig::new(watch_dir),
            import: ImportConfig::new(destination_root),
            convert: ConvertConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch.dir
    }
}

/// Load `Config.toml` (optional) overlaid with `DROPSHELF__SECTION__KEY` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("DROPSHELF")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("watch.extensions")
                .with_list_parse_key("watch.ignore_patterns")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_extensions() {
        let mut watch = WatchConfig::new("/drop");
        watch.extensions = vec!["EPUB".to_string(), ".Txt".to_string()];
        assert_eq!(watch.normalized_extensions(), vec![".epub", ".txt"]);
    }

    #[test]
    fn test_work_dir_defaults_under_destination() {
        let import = ImportConfig::new("/library");
        assert_eq!(import.work_dir(), PathBuf::from("/library/.work"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cfg = Config::builder()
            .set_override("watch.dir", "/drop")
            .unwrap()
            .set_override("import.destination_root", "/library")
            .unwrap()
            .build()
            .unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();
        assert_eq!(app.watch.poll_interval_ms, 5_000);
        assert_eq!(app.watch.stable_duration_ms, 3_000);
        assert_eq!(app.convert.max_chapters, 50);
        assert_eq!(app.convert.timeout_secs, 300);
        assert!(app.convert.auto_convert_mobi);
        assert_eq!(app.catalog.db_path, "dropshelf.db");
    }
}
