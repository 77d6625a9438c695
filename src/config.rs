//! Configuration module for the tcps server.
//!
//! The only externally configurable parameter is the port. Everything else
//! (bind address, backlog, protocol text) is fixed.

use clap::Parser;
use thiserror::Error;

/// Text printed when the port argument is missing or extra arguments are given.
pub const USAGE: &str = "\nUsage:\ntcps <port>\n\n";

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "tcps")]
#[command(version)]
#[command(about = "A loopback TCP server with a fixed greeting and reply", long_about = None)]
pub struct CliArgs {
    /// Port to listen on (loopback only)
    #[arg(allow_negative_numbers = true)]
    pub port: Option<String>,

    /// Anything after the port; its presence means the invocation is wrong
    #[arg(hide = true)]
    pub extra: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
}

/// Result of interpreting the command line.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    /// Start the server with this configuration.
    Serve(Config),
    /// Print [`USAGE`] and exit successfully without binding anything.
    Usage,
}

impl Config {
    /// Load configuration from the process arguments.
    pub fn load() -> Result<Invocation, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve already-parsed arguments into an [`Invocation`].
    pub fn from_cli(cli: CliArgs) -> Result<Invocation, ConfigError> {
        let port = match (cli.port, cli.extra.is_empty()) {
            (Some(port), true) => port,
            _ => return Ok(Invocation::Usage),
        };

        Ok(Invocation::Serve(Config {
            port: parse_port(&port)?,
            log_level: cli.log_level,
        }))
    }
}

/// Parse a port argument, rejecting anything that is not in 1..=65535.
fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Configuration loading errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port '{0}': expected an integer between 1 and 65535")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(args: &[&str]) -> Result<Invocation, ConfigError> {
        let cli = CliArgs::try_parse_from(std::iter::once("tcps").chain(args.iter().copied()))
            .expect("arguments should parse");
        Config::from_cli(cli)
    }

    #[test]
    fn test_port_argument() {
        let invocation = invoke(&["9090"]).unwrap();
        assert_eq!(
            invocation,
            Invocation::Serve(Config {
                port: 9090,
                log_level: "info".to_string(),
            })
        );
    }

    #[test]
    fn test_log_level_flag() {
        match invoke(&["--log-level", "debug", "9090"]).unwrap() {
            Invocation::Serve(config) => assert_eq!(config.log_level, "debug"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_port_is_usage() {
        assert_eq!(invoke(&[]).unwrap(), Invocation::Usage);
    }

    #[test]
    fn test_extra_arguments_are_usage() {
        assert_eq!(invoke(&["9090", "9091"]).unwrap(), Invocation::Usage);
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        assert_eq!(
            invoke(&["http"]),
            Err(ConfigError::InvalidPort("http".to_string()))
        );
    }

    #[test]
    fn test_out_of_range_ports_rejected() {
        assert!(matches!(invoke(&["0"]), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(invoke(&["65536"]), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(invoke(&["90x"]), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn test_negative_port_rejected() {
        assert_eq!(
            invoke(&["-1"]),
            Err(ConfigError::InvalidPort("-1".to_string()))
        );
    }
}
