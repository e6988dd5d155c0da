//! Command-line interface for the relay binary.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Options that override the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the listen address
    pub bind_address: Option<String>,
    /// Optional override for the backend `ip:port`
    pub backend_address: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(command().get_matches())
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("starship.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            backend_address: matches.get_one::<String>("backend").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("starship")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Relay that fronts a Starbound server with admission, kicks and chat injection")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("starship.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Listen address (e.g., 0.0.0.0:21025)"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_name("ADDRESS")
                .help("Backend game server (e.g., 127.0.0.1:21024)"),
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
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["starship"]);
        assert_eq!(args.config_path, PathBuf::from("starship.toml"));
        assert!(args.bind_address.is_none());
        assert!(args.backend_address.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "starship",
            "-c",
            "relay.toml",
            "--bind",
            "127.0.0.1:3000",
            "--backend",
            "10.0.0.2:21024",
            "-l",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("relay.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("127.0.0.1:3000"));
        assert_eq!(args.backend_address.as_deref(), Some("10.0.0.2:21024"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
