//! Command-line interface handling for the bundle host.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Options given here override the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the module data root
    pub data_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Print the handle registry as JSON and exit instead of waiting for a signal
    pub dump_registry: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    pub fn parse() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    fn command() -> Command {
        Command::new("Bundle Host")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Reference host composing bundle runtime modules")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("host.toml"),
            )
            .arg(
                Arg::new("data-dir")
                    .short('d')
                    .long("data-dir")
                    .value_name("DIR")
                    .help("Root directory for module data"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("dump-registry")
                    .long("dump-registry")
                    .help("Print registered handles as JSON after enabling, then shut down")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("host.toml")),
            data_dir: matches.get_one::<String>("data-dir").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            dump_registry: matches.get_flag("dump-registry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(CliArgs::command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse_from(&["bundle_host"]);
        assert_eq!(args.config_path, PathBuf::from("host.toml"));
        assert_eq!(args.data_dir, None);
        assert!(!args.json_logs);
        assert!(!args.dump_registry);
    }

    #[test]
    fn test_overrides() {
        let args = parse_from(&[
            "bundle_host",
            "-c",
            "custom.toml",
            "--data-dir",
            "/tmp/modules",
            "-l",
            "debug",
            "--json-logs",
            "--dump-registry",
        ]);
        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/modules")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.dump_registry);
    }
}
