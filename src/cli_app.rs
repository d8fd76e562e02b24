//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::{Shell as CompletionShell, generate};
use colored::control;
use thiserror::Error;

use branch_balancer::balancer::engine::{BalanceReport, BalanceTarget, Balancer};
use branch_balancer::balancer::signals::InterruptFlag;
use branch_balancer::core::config::Config;
use branch_balancer::core::errors::BalanceError;
use branch_balancer::core::paths::resolve_absolute_path;
use branch_balancer::logger::jsonl::JsonlWriter;
use branch_balancer::mount::discovery::discover;
use branch_balancer::platform::pal::detect_platform;
use branch_balancer::scanner::filters::MetadataErrorPolicy;
use branch_balancer::scanner::locator::Locator;

use crate::console::{Console, OutputMode, Verbosity};

/// Balance files across the branches of a mergerfs union mount.
#[derive(Debug, Parser)]
#[command(
    name = "bbal",
    author,
    version,
    about = "Even out free space across the branches of a mergerfs pool",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Directory inside the mergerfs mount; only files under it are moved.
    #[arg(value_name = "DIR", required_unless_present = "completions")]
    dir: Option<PathBuf>,
    /// Acceptable spread of free space between branches, in percent.
    #[arg(short = 'p', long = "percentage", value_name = "PCT")]
    percentage: Option<f64>,
    /// Only move files whose name matches this glob (repeatable).
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    include: Vec<String>,
    /// Never move files whose name matches this glob (repeatable).
    #[arg(short = 'e', long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
    /// Only move files whose full path matches this glob (repeatable).
    #[arg(short = 'I', long = "include-path", value_name = "GLOB")]
    include_path: Vec<String>,
    /// Never move files whose full path matches this glob (repeatable).
    #[arg(short = 'E', long = "exclude-path", value_name = "GLOB")]
    exclude_path: Vec<String>,
    /// Minimum file size (bytes, or with a K/M/G/T suffix).
    #[arg(short = 's', long = "min-size", value_name = "SIZE")]
    min_size: Option<String>,
    /// Maximum file size (bytes, or with a K/M/G/T suffix).
    #[arg(short = 'S', long = "max-size", value_name = "SIZE")]
    max_size: Option<String>,
    /// Skip files with more than one hard link.
    #[arg(long)]
    ignore_hardlinks: bool,
    /// What to do with files whose metadata cannot be read.
    #[arg(long, value_name = "POLICY", value_parser = ["skip", "warn", "abort"])]
    on_metadata_error: Option<String>,
    /// Select the first move and report it without moving anything.
    #[arg(long)]
    dry_run: bool,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long)]
    json: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Print move commands and extra detail.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Only print the final state.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
    /// Print a shell completion script and exit.
    #[arg(long, value_name = "SHELL", exclusive = true)]
    completions: Option<CompletionShell>,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or a directory outside any union mount.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
        }
    }
}

impl From<BalanceError> for CliError {
    fn from(err: BalanceError) -> Self {
        if err.is_user_error() {
            Self::User(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        let binary_name = command.get_name().to_string();
        generate(shell, &mut command, binary_name, &mut io::stdout());
        return Ok(());
    }

    // Installed first so a signal during startup still ends with the notice.
    let interrupt = InterruptFlag::install();

    let dir = cli
        .dir
        .as_deref()
        .ok_or_else(|| CliError::User("a directory to balance is required".to_string()))?;

    let mut config = Config::load(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, cli)?;
    config.validate()?;

    let verbosity = verbosity(cli);
    if verbosity == Verbosity::Verbose {
        eprintln!("[BAL] config fingerprint {}", config.stable_hash()?);
    }
    let mut console = Console::stdout(output_mode(cli), verbosity);
    let tolerance_pct = config.balance.tolerance_pct;
    if stopped_early(&interrupt, &mut console, tolerance_pct)? {
        return Ok(());
    }

    let dir = resolve_absolute_path(dir);
    let platform = detect_platform()?;
    let mount = match discover(&dir, platform.as_ref(), &config.mount) {
        Ok(mount) => mount,
        Err(err) => {
            if stopped_early(&interrupt, &mut console, tolerance_pct)? {
                return Ok(());
            }
            return Err(mount_error(&dir, err));
        }
    };
    console.mount(&mount)?;

    let locator = Locator::new(config.filter_criteria()?);
    let mut balancer =
        Balancer::new(platform, locator, config.rsync_executor()).with_interrupt(interrupt);
    if config.logging.activity_log_enabled {
        balancer = balancer.with_activity_log(JsonlWriter::open(config.jsonl_config()));
    }

    let target = BalanceTarget {
        branches: mount.branches.clone(),
        relative: mount.relative.clone(),
        tolerance: config.tolerance(),
        dry_run: cli.dry_run,
    };
    let report = balancer.run(&target, &mut console)?;
    console.finish(&report, tolerance_pct)?;
    Ok(())
}

/// Print the interrupt notice and report `true` when a signal has arrived.
fn stopped_early<W: Write>(
    interrupt: &InterruptFlag,
    console: &mut Console<W>,
    tolerance_pct: f64,
) -> Result<bool, CliError> {
    if !interrupt.is_raised() {
        return Ok(false);
    }
    console.finish(&BalanceReport::interrupted(), tolerance_pct)?;
    Ok(true)
}

fn mount_error(dir: &Path, err: BalanceError) -> CliError {
    match err {
        BalanceError::NotAUnionMount { .. } => {
            CliError::User(format!("{} is not a mergerfs mount", dir.display()))
        }
        other => other.into(),
    }
}

/// Command-line values win over the file and the environment. Pattern lists
/// given on the command line replace the configured lists.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) -> Result<(), CliError> {
    if let Some(pct) = cli.percentage {
        config.balance.tolerance_pct = pct;
    }
    if let Some(policy) = &cli.on_metadata_error {
        config.balance.on_metadata_error = policy.parse::<MetadataErrorPolicy>()?;
    }
    let f = &mut config.filters;
    for (from_cli, slot) in [
        (&cli.include, &mut f.include),
        (&cli.exclude, &mut f.exclude),
        (&cli.include_path, &mut f.include_path),
        (&cli.exclude_path, &mut f.exclude_path),
    ] {
        if !from_cli.is_empty() {
            slot.clone_from(from_cli);
        }
    }
    if let Some(size) = &cli.min_size {
        f.min_size.clone_from(size);
    }
    if let Some(size) = &cli.max_size {
        f.max_size.clone_from(size);
    }
    if cli.ignore_hardlinks {
        f.ignore_hardlinks = true;
    }
    Ok(())
}

const fn verbosity(cli: &Cli) -> Verbosity {
    if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("BBAL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

/// `--json` wins, then `BBAL_OUTPUT_FORMAT=json`. Anything else, including
/// `auto` and a piped stdout, keeps the human text.
fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match env_mode.map(|mode| mode.trim().to_ascii_lowercase()).as_deref() {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn parses_all_filter_flags() {
        let cli = parse(&[
            "bbal", "-p", "5", "-i", "*.mkv", "-i", "*.mp4", "-e", "*.part", "-I", "/mnt/*/tv/*",
            "-E", "*/.trash/*", "-s", "10M", "-S", "4G", "--ignore-hardlinks", "/mnt/pool/media",
        ]);
        assert_eq!(cli.percentage, Some(5.0));
        assert_eq!(cli.include, vec!["*.mkv", "*.mp4"]);
        assert_eq!(cli.exclude, vec!["*.part"]);
        assert_eq!(cli.include_path, vec!["/mnt/*/tv/*"]);
        assert_eq!(cli.exclude_path, vec!["*/.trash/*"]);
        assert_eq!(cli.min_size.as_deref(), Some("10M"));
        assert_eq!(cli.max_size.as_deref(), Some("4G"));
        assert!(cli.ignore_hardlinks);
        assert_eq!(cli.dir, Some(PathBuf::from("/mnt/pool/media")));
    }

    #[test]
    fn dir_is_required_without_completions() {
        assert!(Cli::try_parse_from(["bbal", "-p", "2"]).is_err());
        assert!(Cli::try_parse_from(["bbal", "--completions", "bash"]).is_ok());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["bbal", "--completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["bbal", "-v", "-q", "/mnt"]).is_err());
    }

    #[test]
    fn metadata_policy_values_are_checked() {
        assert!(Cli::try_parse_from(["bbal", "--on-metadata-error", "warn", "/mnt"]).is_ok());
        assert!(Cli::try_parse_from(["bbal", "--on-metadata-error", "ignore", "/mnt"]).is_err());
    }

    #[test]
    fn cli_overrides_replace_config_values() {
        let mut config = Config::default();
        config.filters.include = vec!["*.iso".to_string()];
        config.filters.exclude = vec!["*.tmp".to_string()];
        let cli = parse(&[
            "bbal", "-p", "10", "-i", "*.mkv", "-s", "1K", "--on-metadata-error", "abort", "/mnt",
        ]);
        apply_cli_overrides(&mut config, &cli).unwrap();

        assert!((config.tolerance() - 0.10).abs() < 1e-12);
        assert_eq!(config.filters.include, vec!["*.mkv"]);
        assert_eq!(config.filters.exclude, vec!["*.tmp"]);
        assert_eq!(config.filters.min_size, "1K");
        assert_eq!(config.balance.on_metadata_error, MetadataErrorPolicy::Abort);
        config.validate().unwrap();
    }

    #[test]
    fn bad_size_is_a_user_error() {
        let mut config = Config::default();
        let cli = parse(&["bbal", "-s", "12X", "/mnt"]);
        apply_cli_overrides(&mut config, &cli).unwrap();
        let err: CliError = config.validate().unwrap_err().into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn signal_during_startup_ends_with_notice() {
        let interrupt = InterruptFlag::new();
        let mut console = Console::new(Vec::new(), OutputMode::Human, Verbosity::Quiet);
        assert!(!stopped_early(&interrupt, &mut console, 2.0).unwrap());

        interrupt.raise();
        assert!(stopped_early(&interrupt, &mut console, 2.0).unwrap());
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out.trim_end(), "exiting: CTRL-C pressed");
    }

    #[test]
    fn mount_failure_names_the_directory() {
        let err = mount_error(
            Path::new("/srv/data"),
            BalanceError::NotAUnionMount {
                path: PathBuf::from("/srv/data"),
                details: "no .mergerfs control file".to_string(),
            },
        );
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "/srv/data is not a mergerfs mount");

        let err = mount_error(
            Path::new("/srv/data"),
            BalanceError::Attribute {
                path: PathBuf::from("/srv/data/.mergerfs"),
                name: "user.mergerfs.srcmounts".to_string(),
                details: "EIO".to_string(),
            },
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn runtime_errors_exit_two() {
        let err: CliError = BalanceError::CapacityQuery {
            path: PathBuf::from("/mnt/a"),
            details: "gone".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(resolve_output_mode(true, Some("human")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" JSON ")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("human")), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("auto")), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None), OutputMode::Human);
    }
}
