//! Configuration system: TOML file + `BBAL_*` env var overrides + defaults.
//!
//! Precedence, lowest to highest: built-in defaults, the config file,
//! environment variables, then command-line flags (applied by the CLI).

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BalanceError, Result};
use crate::core::paths::trim_trailing_slash;
use crate::core::units::parse_size;
use crate::logger::jsonl::JsonlConfig;
use crate::mover::options::MoveOptions;
use crate::mover::rsync::{DEFAULT_PROGRAM, RsyncExecutor};
use crate::scanner::filters::{FilterCriteria, MetadataErrorPolicy};
use crate::scanner::patterns::{IncludeExclude, validate_glob_pattern};

/// Full bbal configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub balance: BalanceConfig,
    pub filters: FiltersConfig,
    pub mover: MoverConfig,
    pub mount: MountConfig,
    pub logging: LoggingConfig,
}

/// Convergence target and traversal error handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BalanceConfig {
    /// Maximum spread of free space across branches, in percent.
    pub tolerance_pct: f64,
    pub on_metadata_error: MetadataErrorPolicy,
}

/// Which files may be moved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FiltersConfig {
    /// File-name globs; empty means `*`.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Full-path globs; empty means `*`.
    pub include_path: Vec<String>,
    pub exclude_path: Vec<String>,
    /// Size strings such as `"512"` or `"10M"`; `"0"` or empty disables the bound.
    pub min_size: String,
    pub max_size: String,
    pub ignore_hardlinks: bool,
}

/// The external move tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MoverConfig {
    pub program: String,
    pub extra_args: Vec<String>,
    pub options: MoveOptions,
}

/// How a union mount is recognised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MountConfig {
    /// Control file searched for in `dir` and its ancestors.
    pub control_file: String,
    /// Attribute whose presence proves the mount is genuine.
    pub version_attr: String,
    /// Attribute holding the colon-separated branch list.
    pub branches_attr: String,
}

/// Durable JSONL activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub activity_log_enabled: bool,
    pub activity_log: PathBuf,
    pub activity_log_fallback: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: 2.0,
            on_metadata_error: MetadataErrorPolicy::Skip,
        }
    }
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            extra_args: Vec::new(),
            options: MoveOptions::default(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            control_file: ".mergerfs".to_string(),
            version_attr: "user.mergerfs.version".to_string(),
            branches_attr: "user.mergerfs.srcmounts".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log_enabled: false,
            activity_log: home_dir()
                .join(".local")
                .join("share")
                .join("bbal")
                .join("activity.jsonl"),
            activity_log_fallback: None,
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Config {
    /// Default configuration path: `~/.config/bbal/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("bbal").join("config.toml")
    }

    /// Load config from the default or an explicit path, then apply env overrides.
    ///
    /// A missing file at the default path yields defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| BalanceError::io(&path_buf, source))?;
            Self::from_toml_str(&raw)?
        } else if path.is_some() {
            return Err(BalanceError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic FNV-1a fingerprint of the effective config.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Tolerance as a fraction (2% → 0.02).
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.balance.tolerance_pct / 100.0
    }

    /// Compile the filter section into immutable criteria.
    pub fn filter_criteria(&self) -> Result<FilterCriteria> {
        let f = &self.filters;
        Ok(FilterCriteria {
            names: IncludeExclude::compile(&f.include, &f.exclude)?,
            paths: IncludeExclude::compile(&f.include_path, &f.exclude_path)?,
            min_size: parse_optional_size(&f.min_size)?,
            max_size: parse_optional_size(&f.max_size)?,
            exclude_hardlinks: f.ignore_hardlinks,
            on_metadata_error: self.balance.on_metadata_error,
        })
    }

    #[must_use]
    pub fn rsync_executor(&self) -> RsyncExecutor {
        RsyncExecutor::new(self.mover.program.clone(), self.mover.options)
            .with_extra_args(self.mover.extra_args.clone())
    }

    #[must_use]
    pub fn jsonl_config(&self) -> JsonlConfig {
        JsonlConfig {
            path: self.logging.activity_log.clone(),
            fallback_path: self.logging.activity_log_fallback.clone(),
            max_size_bytes: self.logging.max_size_bytes,
            max_rotated_files: self.logging.max_rotated_files,
        }
    }

    /// Apply `BBAL_*` overrides read through `lookup`.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        set_from(&mut lookup, "BBAL_TOLERANCE_PCT", &mut self.balance.tolerance_pct)?;
        set_from(
            &mut lookup,
            "BBAL_ON_METADATA_ERROR",
            &mut self.balance.on_metadata_error,
        )?;
        if let Some(raw) = lookup("BBAL_MIN_SIZE") {
            self.filters.min_size = raw;
        }
        if let Some(raw) = lookup("BBAL_MAX_SIZE") {
            self.filters.max_size = raw;
        }
        set_from(
            &mut lookup,
            "BBAL_IGNORE_HARDLINKS",
            &mut self.filters.ignore_hardlinks,
        )?;
        if let Some(raw) = lookup("BBAL_MOVER_PROGRAM") {
            self.mover.program = raw;
        }
        if let Some(raw) = lookup("BBAL_CONTROL_FILE") {
            self.mount.control_file = raw;
        }
        set_from(
            &mut lookup,
            "BBAL_ACTIVITY_LOG_ENABLED",
            &mut self.logging.activity_log_enabled,
        )?;
        if let Some(raw) = lookup("BBAL_ACTIVITY_LOG") {
            self.logging.activity_log = PathBuf::from(raw);
        }
        Ok(())
    }

    fn normalize_paths(&mut self) {
        self.logging.activity_log = trim_trailing_slash(&self.logging.activity_log);
        if let Some(fallback) = self.logging.activity_log_fallback.as_mut() {
            *fallback = trim_trailing_slash(fallback);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let tolerance = self.balance.tolerance_pct;
        if !tolerance.is_finite() || !(0.0..=100.0).contains(&tolerance) {
            return Err(BalanceError::InvalidConfig {
                details: format!("balance.tolerance_pct must be in [0,100], got {tolerance}"),
            });
        }

        let min = parse_optional_size(&self.filters.min_size)?;
        let max = parse_optional_size(&self.filters.max_size)?;
        if min != 0 && max != 0 && max < min {
            return Err(BalanceError::InvalidConfig {
                details: format!("filters.max_size ({max}) is below filters.min_size ({min})"),
            });
        }

        let f = &self.filters;
        for pattern in f
            .include
            .iter()
            .chain(&f.exclude)
            .chain(&f.include_path)
            .chain(&f.exclude_path)
        {
            validate_glob_pattern(pattern)?;
        }

        if self.mover.program.trim().is_empty() {
            return Err(BalanceError::InvalidConfig {
                details: "mover.program must not be empty".to_string(),
            });
        }

        let control = &self.mount.control_file;
        if control.is_empty() || control.contains('/') {
            return Err(BalanceError::InvalidConfig {
                details: format!("mount.control_file must be a bare file name, got {control:?}"),
            });
        }
        for (name, value) in [
            ("mount.version_attr", &self.mount.version_attr),
            ("mount.branches_attr", &self.mount.branches_attr),
        ] {
            if value.trim().is_empty() {
                return Err(BalanceError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }

        if self.logging.activity_log_enabled && self.logging.activity_log.as_os_str().is_empty() {
            return Err(BalanceError::InvalidConfig {
                details: "logging.activity_log must be set when the activity log is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// `""` and `"0"` both mean "no bound".
fn parse_optional_size(raw: &str) -> Result<u64> {
    if raw.trim().is_empty() {
        Ok(0)
    } else {
        parse_size(raw)
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[BAL-CONFIG] WARNING: HOME not set, falling back to /tmp");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_from<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<T>().map_err(|error| BalanceError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert!((cfg.tolerance() - 0.02).abs() < 1e-12);
        assert_eq!(cfg.mount.control_file, ".mergerfs");
        assert_eq!(cfg.mover.program, "rsync");
    }

    #[test]
    fn toml_sections_parse_with_partial_content() {
        let cfg = Config::from_toml_str(
            r#"
            [balance]
            tolerance_pct = 5.0
            on_metadata_error = "warn"

            [filters]
            include = ["*.mkv"]
            exclude_path = ["*/.trash/*"]
            min_size = "10M"
            ignore_hardlinks = true

            [mover.options]
            show_progress = false
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.balance.on_metadata_error, MetadataErrorPolicy::Warn);
        assert!((cfg.tolerance() - 0.05).abs() < 1e-12);
        assert!(!cfg.mover.options.show_progress);
        assert!(cfg.mover.options.remove_source_files);
        assert_eq!(cfg.mount.branches_attr, "user.mergerfs.srcmounts");

        let criteria = cfg.filter_criteria().unwrap();
        assert_eq!(criteria.min_size, 10 * 1024 * 1024);
        assert_eq!(criteria.max_size, 0);
        assert!(criteria.exclude_hardlinks);
        assert!(criteria.names.admits("a.mkv"));
        assert!(!criteria.names.admits("a.srt"));
        assert!(!criteria.paths.admits("/mnt/a/.trash/x"));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = Config::from_toml_str("[balance]\non_metadata_error = \"ignore\"").unwrap_err();
        assert_eq!(err.code(), "BAL-1003");
    }

    #[test]
    fn tolerance_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.balance.tolerance_pct = 101.0;
        assert!(cfg.validate().unwrap_err().to_string().contains("tolerance_pct"));
        cfg.balance.tolerance_pct = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn max_below_min_rejected() {
        let mut cfg = Config::default();
        cfg.filters.min_size = "2G".to_string();
        cfg.filters.max_size = "1G".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_size"));
    }

    #[test]
    fn zero_max_means_unbounded_and_passes() {
        let mut cfg = Config::default();
        cfg.filters.min_size = "2G".to_string();
        cfg.filters.max_size = "0".to_string();
        cfg.validate().unwrap();
    }

    #[test]
    fn malformed_size_rejected() {
        let mut cfg = Config::default();
        cfg.filters.min_size = "1.5G".to_string();
        assert_eq!(cfg.validate().unwrap_err().code(), "BAL-1004");
    }

    #[test]
    fn control_file_must_be_bare_name() {
        let mut cfg = Config::default();
        cfg.mount.control_file = "sub/.mergerfs".to_string();
        assert!(cfg.validate().is_err());
        cfg.mount.control_file = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_program_rejected() {
        let mut cfg = Config::default();
        cfg.mover.program = "  ".to_string();
        assert!(cfg.validate().unwrap_err().to_string().contains("mover.program"));
    }

    #[test]
    fn env_overrides_apply_over_file_values() {
        let env = vars(&[
            ("BBAL_TOLERANCE_PCT", "7.5"),
            ("BBAL_ON_METADATA_ERROR", "abort"),
            ("BBAL_MAX_SIZE", "4G"),
            ("BBAL_IGNORE_HARDLINKS", "true"),
            ("BBAL_MOVER_PROGRAM", "/usr/local/bin/rsync"),
            ("BBAL_ACTIVITY_LOG_ENABLED", "true"),
            ("BBAL_ACTIVITY_LOG", "/var/log/bbal.jsonl"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|k| env.get(k).cloned()).unwrap();

        assert!((cfg.balance.tolerance_pct - 7.5).abs() < 1e-12);
        assert_eq!(cfg.balance.on_metadata_error, MetadataErrorPolicy::Abort);
        assert_eq!(cfg.filters.max_size, "4G");
        assert!(cfg.filters.ignore_hardlinks);
        assert_eq!(cfg.mover.program, "/usr/local/bin/rsync");
        assert!(cfg.logging.activity_log_enabled);
        assert_eq!(cfg.jsonl_config().path, PathBuf::from("/var/log/bbal.jsonl"));
        cfg.validate().unwrap();
    }

    #[test]
    fn invalid_env_value_rejected() {
        let env = vars(&[("BBAL_IGNORE_HARDLINKS", "sometimes")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|k| env.get(k).cloned())
            .unwrap_err();
        assert_eq!(err.code(), "BAL-1003");
        assert!(err.to_string().contains("BBAL_IGNORE_HARDLINKS"));
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/bbal/config.toml"))).unwrap_err();
        assert!(matches!(err, BalanceError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[balance]\ntolerance_pct = 10.0\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        if env_var("BBAL_TOLERANCE_PCT").is_none() {
            assert!((cfg.balance.tolerance_pct - 10.0).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_trims_trailing_slash_on_log_paths() {
        let mut cfg = Config::default();
        cfg.logging.activity_log = PathBuf::from("/var/log/bbal/");
        cfg.logging.activity_log_fallback = Some(PathBuf::from("/tmp/"));
        cfg.normalize_paths();
        assert_eq!(cfg.logging.activity_log, PathBuf::from("/var/log/bbal"));
        assert_eq!(cfg.logging.activity_log_fallback, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn executor_reflects_mover_section() {
        let mut cfg = Config::default();
        cfg.mover.program = "/opt/rsync".to_string();
        cfg.mover.extra_args = vec!["--bwlimit=1M".to_string()];
        let exec = cfg.rsync_executor();
        assert_eq!(exec.program(), "/opt/rsync");
        let line = exec.command_line(Path::new("/a"), Path::new("/b"), Path::new("f"));
        assert!(line.contains("--bwlimit=1M"));
    }

    #[test]
    fn stable_hash_deterministic_and_sensitive() {
        let cfg = Config::default();
        assert_eq!(cfg.stable_hash().unwrap(), cfg.stable_hash().unwrap());
        let mut other = cfg.clone();
        other.balance.tolerance_pct = 3.0;
        assert_ne!(cfg.stable_hash().unwrap(), other.stable_hash().unwrap());
    }
}
