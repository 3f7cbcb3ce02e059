//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Roots of the watched and output trees
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_source_folder")]
    pub source_folder: PathBuf,
    #[serde(default = "default_dest_folder")]
    pub dest_folder: PathBuf,
}

fn default_source_folder() -> PathBuf {
    PathBuf::from("/app/source")
}

fn default_dest_folder() -> PathBuf {
    PathBuf::from("/app/destination")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_folder: default_source_folder(),
            dest_folder: default_dest_folder(),
        }
    }
}

/// Encoder selection.
///
/// Vendor, quality and codec are kept as the raw strings the operator wrote;
/// the daemon resolves them against its argument table and logs any fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Use the hardware encoder branch of the argument table
    #[serde(default = "default_true")]
    pub enable_hw_accel: bool,
    /// Hardware vendor selector (`nvidia` / `intel`)
    #[serde(default = "default_hw_encoding_type")]
    pub hw_encoding_type: String,
    /// Quality tier selector (`LOW` / `MEDIUM` / `HIGH`)
    #[serde(default = "default_encoding_quality")]
    pub encoding_quality: String,
    /// Output video codec (`av1` / `hevc` / `h264`)
    #[serde(default = "default_encoding_codec")]
    pub encoding_codec: String,
    /// Output height in pixels; width follows the source aspect ratio
    #[serde(default = "default_target_height")]
    pub target_height: u32,
    /// Hard ceiling for a single encoder run
    #[serde(default = "default_encode_timeout_hours")]
    pub encode_timeout_hours: u64,
}

fn default_true() -> bool {
    true
}

fn default_hw_encoding_type() -> String {
    "intel".to_string()
}

fn default_encoding_quality() -> String {
    "MEDIUM".to_string()
}

fn default_encoding_codec() -> String {
    "av1".to_string()
}

fn default_target_height() -> u32 {
    720
}

fn default_encode_timeout_hours() -> u64 {
    48
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            enable_hw_accel: true,
            hw_encoding_type: default_hw_encoding_type(),
            encoding_quality: default_encoding_quality(),
            encoding_codec: default_encoding_codec(),
            target_height: default_target_height(),
            encode_timeout_hours: default_encode_timeout_hours(),
        }
    }
}

/// Version naming and cross-host symlinks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionsConfig {
    /// Source and destination share one tree; outputs get a distinct name
    #[serde(default)]
    pub multi_version_mode: bool,
    /// Host-visible root for symlink targets; empty disables symlinks
    #[serde(default)]
    pub symlink_target_prefix: String,
    #[serde(default = "default_symlink_version_suffix")]
    pub symlink_version_suffix: String,
}

fn default_symlink_version_suffix() -> String {
    " - 720p".to_string()
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            multi_version_mode: false,
            symlink_target_prefix: String::new(),
            symlink_version_suffix: default_symlink_version_suffix(),
        }
    }
}

/// Write-completion detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StabilityConfig {
    /// Consecutive unchanged size samples before a file counts as complete
    #[serde(default = "default_required_stable_samples")]
    pub required_stable_samples: u32,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_stability_timeout_hours")]
    pub timeout_hours: u64,
    /// Window used to decide whether a leftover temp file is still being written
    #[serde(default = "default_temp_growth_window_secs")]
    pub temp_growth_window_secs: u64,
}

fn default_required_stable_samples() -> u32 {
    60
}

fn default_sample_interval_secs() -> u64 {
    1
}

fn default_stability_timeout_hours() -> u64 {
    24
}

fn default_temp_growth_window_secs() -> u64 {
    10
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            required_stable_samples: default_required_stable_samples(),
            sample_interval_secs: default_sample_interval_secs(),
            timeout_hours: default_stability_timeout_hours(),
            temp_growth_window_secs: default_temp_growth_window_secs(),
        }
    }
}

/// Skip sources that are already at or below the output resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityGateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_target_height")]
    pub max_height: u32,
    /// Encode anyway when the probe fails
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_height: default_target_height(),
            fail_open: true,
        }
    }
}

/// Reconciliation and rediscovery schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_rescan_interval_minutes")]
    pub rescan_interval_minutes: u64,
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_rescan_interval_minutes() -> u64 {
    60
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_cleanup_interval_hours(),
            rescan_interval_minutes: default_rescan_interval_minutes(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkersConfig {
    /// Maximum concurrent jobs (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_probe_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Source tree scanning
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Extra filename regexes to ignore, on top of the built-in list
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

/// Metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_bind")]
    pub bind: String,
}

fn default_metrics_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_metrics_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub versions: VersionsConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub quality_gate: QualityGateConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Parse a boolean the way operators write it in compose files.
fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = env::var(key) {
        if let Ok(parsed) = val.trim().parse::<T>() {
            *target = parsed;
        }
    }
}

fn override_bool(key: &str, target: &mut bool) {
    if let Ok(val) = env::var(key) {
        if let Some(parsed) = parse_bool(&val) {
            *target = parsed;
        }
    }
}

fn override_string(key: &str, target: &mut String) {
    if let Ok(val) = env::var(key) {
        *target = val;
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Unparsable values are ignored and the existing value is kept.
    /// `SYMLINK_TARGET_PREFIX` may be set to the empty string to disable
    /// version symlinks.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SOURCE_FOLDER") {
            if !val.is_empty() {
                self.paths.source_folder = PathBuf::from(val);
            }
        }
        if let Ok(val) = env::var("DEST_FOLDER") {
            if !val.is_empty() {
                self.paths.dest_folder = PathBuf::from(val);
            }
        }

        override_bool("ENABLE_HW_ACCEL", &mut self.encoding.enable_hw_accel);
        override_string("HW_ENCODING_TYPE", &mut self.encoding.hw_encoding_type);
        override_string("ENCODING_QUALITY", &mut self.encoding.encoding_quality);
        override_string("ENCODING_CODEC", &mut self.encoding.encoding_codec);
        override_parsed("TARGET_HEIGHT", &mut self.encoding.target_height);

        override_bool("MULTI_VERSION_MODE", &mut self.versions.multi_version_mode);
        override_string(
            "SYMLINK_TARGET_PREFIX",
            &mut self.versions.symlink_target_prefix,
        );
        override_string(
            "SYMLINK_VERSION_SUFFIX",
            &mut self.versions.symlink_version_suffix,
        );

        override_parsed("CLEANUP_INTERVAL_HOURS", &mut self.cleanup.interval_hours);
        override_parsed(
            "RESCAN_INTERVAL_MINUTES",
            &mut self.cleanup.rescan_interval_minutes,
        );

        override_parsed(
            "STABILITY_CHECKS",
            &mut self.stability.required_stable_samples,
        );
        override_parsed("STABILITY_TIMEOUT_HOURS", &mut self.stability.timeout_hours);

        override_bool("QUALITY_GATE_FAIL_OPEN", &mut self.quality_gate.fail_open);

        override_parsed("MAX_CONCURRENT_JOBS", &mut self.workers.max_concurrent_jobs);

        if let Ok(val) = env::var("FFMPEG_PATH") {
            if !val.is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }
        if let Ok(val) = env::var("FFPROBE_PATH") {
            if !val.is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("IGNORE_PATTERNS") {
            self.scan.ignore_patterns = val
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        override_bool("METRICS_ENABLED", &mut self.metrics.enabled);
        if let Ok(val) = env::var("METRICS_BIND") {
            if !val.is_empty() {
                self.metrics.bind = val;
            }
        }
    }

    /// Load configuration from an optional file and apply environment overrides
    ///
    /// Without a file the defaults are used, so a pure environment-driven
    /// deployment needs no config file at all.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Source and destination are the same directory.
    pub fn same_tree(&self) -> bool {
        self.paths.source_folder == self.paths.dest_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "SOURCE_FOLDER",
        "DEST_FOLDER",
        "ENABLE_HW_ACCEL",
        "HW_ENCODING_TYPE",
        "ENCODING_QUALITY",
        "ENCODING_CODEC",
        "TARGET_HEIGHT",
        "MULTI_VERSION_MODE",
        "SYMLINK_TARGET_PREFIX",
        "SYMLINK_VERSION_SUFFIX",
        "CLEANUP_INTERVAL_HOURS",
        "RESCAN_INTERVAL_MINUTES",
        "STABILITY_CHECKS",
        "STABILITY_TIMEOUT_HOURS",
        "QUALITY_GATE_FAIL_OPEN",
        "MAX_CONCURRENT_JOBS",
        "FFMPEG_PATH",
        "FFPROBE_PATH",
        "IGNORE_PATTERNS",
        "METRICS_ENABLED",
        "METRICS_BIND",
    ];

    fn clear_env_vars() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_sections(
            hw in proptest::bool::ANY,
            height in 144u32..4320,
            samples in 1u32..600,
            interval in 1u64..168,
            max_jobs in 0u32..16,
        ) {
            let toml_str = format!(
                r#"
[encoding]
enable_hw_accel = {}
target_height = {}

[stability]
required_stable_samples = {}

[cleanup]
interval_hours = {}

[workers]
max_concurrent_jobs = {}
"#,
                hw, height, samples, interval, max_jobs
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.encoding.enable_hw_accel, hw);
            prop_assert_eq!(config.encoding.target_height, height);
            prop_assert_eq!(config.stability.required_stable_samples, samples);
            prop_assert_eq!(config.cleanup.interval_hours, interval);
            prop_assert_eq!(config.workers.max_concurrent_jobs, max_jobs);
            // untouched sections keep their defaults
            prop_assert_eq!(config.versions, VersionsConfig::default());
        }

        #[test]
        fn prop_env_overrides_cleanup_interval(
            initial in 1u64..48,
            overridden in 1u64..1000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[cleanup]\ninterval_hours = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("CLEANUP_INTERVAL_HOURS", overridden.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.cleanup.interval_hours, overridden);
        }

        #[test]
        fn prop_env_overrides_hw_accel(
            initial in proptest::bool::ANY,
            overridden in proptest::bool::ANY,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[encoding]\nenable_hw_accel = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("ENABLE_HW_ACCEL", overridden.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encoding.enable_hw_accel, overridden);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.paths.source_folder, PathBuf::from("/app/source"));
        assert_eq!(config.paths.dest_folder, PathBuf::from("/app/destination"));
        assert!(config.encoding.enable_hw_accel);
        assert_eq!(config.encoding.encoding_quality, "MEDIUM");
        assert_eq!(config.encoding.target_height, 720);
        assert_eq!(config.stability.required_stable_samples, 60);
        assert_eq!(config.stability.timeout_hours, 24);
        assert_eq!(config.versions.symlink_version_suffix, " - 720p");
        assert!(config.versions.symlink_target_prefix.is_empty());
        assert!(config.quality_gate.fail_open);
        assert_eq!(config.workers.max_concurrent_jobs, 0);
        assert_eq!(config.metrics.bind, "127.0.0.1:7878");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[paths]
source_folder = "/media/movies"

[versions]
symlink_target_prefix = "/mnt/nas/encoded"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.paths.source_folder, PathBuf::from("/media/movies"));
        assert_eq!(config.paths.dest_folder, PathBuf::from("/app/destination"));
        assert_eq!(config.versions.symlink_target_prefix, "/mnt/nas/encoded");
        assert_eq!(config.versions.symlink_version_suffix, " - 720p");
        assert!(!config.same_tree());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = Config::parse_toml("[encoding\nenable_hw_accel = true");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides_string_keys() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("SOURCE_FOLDER", "/data/in");
        env::set_var("DEST_FOLDER", "/data/in");
        env::set_var("HW_ENCODING_TYPE", "nvidia");
        env::set_var("ENCODING_QUALITY", "high");
        env::set_var("ENCODING_CODEC", "hevc");
        env::set_var("SYMLINK_VERSION_SUFFIX", " - 480p");
        env::set_var("IGNORE_PATTERNS", "sample, trailer ,,");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.paths.source_folder, PathBuf::from("/data/in"));
        assert!(config.same_tree());
        assert_eq!(config.encoding.hw_encoding_type, "nvidia");
        assert_eq!(config.encoding.encoding_quality, "high");
        assert_eq!(config.encoding.encoding_codec, "hevc");
        assert_eq!(config.versions.symlink_version_suffix, " - 480p");
        assert_eq!(config.scan.ignore_patterns, vec!["sample", "trailer"]);
    }

    #[test]
    fn test_invalid_env_values_keep_existing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENABLE_HW_ACCEL", "maybe");
        env::set_var("CLEANUP_INTERVAL_HOURS", "soon");
        config.apply_env_overrides();
        clear_env_vars();

        assert!(config.encoding.enable_hw_accel);
        assert_eq!(config.cleanup.interval_hours, 24);
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load(None::<&Path>).expect("defaults always load");
        assert_eq!(config, Config::default());
    }
}
