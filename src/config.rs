use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the bracket-hdr library.
///
/// Controls how brackets are detected and labeled, how labeled groups are
/// discovered, where the pipeline writes its artifacts, and which external
/// tools are invoked.
///
/// # Loading
///
/// ```rust,no_run
/// use bracket_hdr::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.labeler.time_window_secs = 1.5;
/// config.pipeline.batch_size = 5;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bracket detection and renaming.
    pub labeler: LabelerConfig,
    /// Group discovery for the fusion pipeline.
    pub discovery: DiscoveryConfig,
    /// Scratch/output folders and batching.
    pub pipeline: PipelineConfig,
    /// External alignment and fusion executables.
    pub tools: ToolsConfig,
}

/// Settings for the bracket labeler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Maximum gap (seconds) between two captures of the same bracket.
    /// A gap exactly equal to the window stays in the bracket.
    pub time_window_secs: f64,
    /// Label prefix written into new filenames (`Group` → `Group_1_E1.arw`).
    pub prefix: String,
    /// RAW extensions to pick up, without the leading dot.
    pub raw_extensions: Vec<String>,
}

/// Settings for group discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Label prefix to look for at the start of filenames.
    pub prefix: String,
    /// Image extensions to pick up, without the leading dot.
    pub image_extensions: Vec<String>,
}

/// Settings for the align + fuse pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the per-group scratch folders holding aligned TIFFs.
    pub aligned_dir: PathBuf,
    /// Folder receiving the fused `HDR_*` images.
    pub output_dir: PathBuf,
    /// Maximum number of aligned images fused in one invocation.
    pub batch_size: usize,
    /// Extension of the fused images, without the leading dot.
    pub output_extension: String,
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Alignment executable (Hugin's `align_image_stack`).
    pub align_program: String,
    /// Filename prefix the aligner gives its output TIFFs.
    pub align_artifact_prefix: String,
    /// Fusion executable (`enfuse`).
    pub fuse_program: String,
    /// Per-invocation timeout in seconds. `None` or `0` waits forever.
    pub timeout_secs: Option<u64>,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            time_window_secs: 2.0,
            prefix: "Group".to_string(),
            raw_extensions: ["arw", "cr2", "nef", "orf", "dng", "raf"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: "Group".to_string(),
            image_extensions: vec!["jpg".to_string()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aligned_dir: PathBuf::from("./aligned"),
            output_dir: PathBuf::from("./out"),
            batch_size: 3,
            output_extension: "jpg".to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            align_program: "align_image_stack".to_string(),
            align_artifact_prefix: "aligned_".to_string(),
            fuse_program: "enfuse".to_string(),
            timeout_secs: Some(600),
        }
    }
}

impl LabelerConfig {
    /// The bracket window as a [`Duration`]. Out-of-range values (rejected by
    /// [`Config::validate`]) collapse to zero.
    pub fn time_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_window_secs).unwrap_or(Duration::ZERO)
    }
}

impl ToolsConfig {
    /// The subprocess timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    ///
    /// A missing file yields the defaults. A file that exists is parsed,
    /// normalized and validated, so a bad window or batch size is reported
    /// here with the file's path rather than later in the run.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let mut config: Config = std::fs::read_to_string(&config_path)
            .map_err(anyhow::Error::from)
            .and_then(|contents| serde_json::from_str(&contents).map_err(anyhow::Error::from))
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        config.normalize();
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", config_path.display()))?;
        log::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Lowercase extensions and strip leading dots so `.ARW` and `arw` match alike.
    pub fn normalize(&mut self) {
        normalize_extensions(&mut self.labeler.raw_extensions);
        normalize_extensions(&mut self.discovery.image_extensions);
        self.pipeline.output_extension = normalize_extension(&self.pipeline.output_extension);
    }

    /// Reject settings the labeler or pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let window = self.labeler.time_window_secs;
        if !window.is_finite() || window < 0.0 {
            anyhow::bail!("time window must be a non-negative number of seconds, got {window}");
        }
        if self.labeler.prefix.is_empty() || self.discovery.prefix.is_empty() {
            anyhow::bail!("label prefix must not be empty");
        }
        if self.labeler.raw_extensions.is_empty() {
            anyhow::bail!("at least one RAW extension is required");
        }
        if self.discovery.image_extensions.is_empty() {
            anyhow::bail!("at least one image extension is required");
        }
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }
        if self.pipeline.output_extension.is_empty() {
            anyhow::bail!("output extension must not be empty");
        }
        if self.tools.align_artifact_prefix.is_empty() {
            anyhow::bail!("aligner artifact prefix must not be empty");
        }
        Ok(())
    }
}

fn normalize_extensions(exts: &mut Vec<String>) {
    for ext in exts.iter_mut() {
        *ext = normalize_extension(ext);
    }
    exts.retain(|e| !e.is_empty());
    exts.dedup();
}

/// `".JPG"` → `"jpg"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.labeler.time_window_secs, 2.0);
        assert_eq!(config.labeler.prefix, "Group");
        assert!(config.labeler.raw_extensions.contains(&"arw".to_string()));
        assert_eq!(config.discovery.image_extensions, vec!["jpg".to_string()]);
        assert_eq!(config.pipeline.batch_size, 3);
        assert_eq!(config.pipeline.output_dir, PathBuf::from("./out"));
        assert_eq!(config.pipeline.aligned_dir, PathBuf::from("./aligned"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.pipeline.batch_size = 5;
        config.labeler.prefix = "Bracket".to_string();
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.pipeline.batch_size, 5);
        assert_eq!(loaded.labeler.prefix, "Bracket");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.pipeline.batch_size, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "pipeline": { "batch_size": 4 } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.pipeline.batch_size, 4);
        assert_eq!(config.pipeline.output_extension, "jpg");
        assert_eq!(config.labeler.time_window_secs, 2.0);
        assert_eq!(config.tools.fuse_program, "enfuse");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn invalid_values_in_file_are_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "pipeline": { "batch_size": 0 } }"#).unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("batch size"));
    }

    #[test]
    fn loaded_extensions_are_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "discovery": { "image_extensions": [".JPG", "Tif"] } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.discovery.image_extensions, vec!["jpg".to_string(), "tif".to_string()]);
    }

    #[test]
    fn extensions_are_normalized() {
        let mut config = Config::default();
        config.labeler.raw_extensions = vec![".ARW".into(), "nef".into(), "".into()];
        config.pipeline.output_extension = ".TIF".into();
        config.normalize();
        assert_eq!(config.labeler.raw_extensions, vec!["arw".to_string(), "nef".to_string()]);
        assert_eq!(config.pipeline.output_extension, "tif");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.labeler.time_window_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.labeler.time_window_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.prefix.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_is_valid() {
        let mut config = Config::default();
        config.labeler.time_window_secs = 0.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.labeler.time_window(), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let mut tools = ToolsConfig::default();
        assert_eq!(tools.timeout(), Some(Duration::from_secs(600)));
        tools.timeout_secs = Some(0);
        assert_eq!(tools.timeout(), None);
        tools.timeout_secs = None;
        assert_eq!(tools.timeout(), None);
    }
}
