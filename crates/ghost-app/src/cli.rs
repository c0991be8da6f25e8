//! CLI argument definitions for the Ghost binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ghost - replies to you in your own words, recalled from a vector index.
#[derive(Parser, Debug)]
#[command(name = "ghost", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Redis URL, overriding `index.redis_url`.
    #[arg(long = "redis-url", global = true)]
    pub redis_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive query loop (default).
    Chat {
        /// Serve from an embedding artifact instead of Redis.
        #[arg(long = "in-memory", value_name = "PATH")]
        in_memory: Option<PathBuf>,
    },
    /// Embed the ingestion artifact and write the embedding artifact.
    Embed {
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Load the embedding artifact into the vector index.
    Load {
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,
    },
}

impl CliArgs {
    /// The subcommand to run; `chat` when none is given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Chat { in_memory: None })
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > GHOST_CONFIG env var > ~/.ghost/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("GHOST_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        match std::env::var("RUST_LOG") {
            Ok(filter) if !filter.trim().is_empty() => filter,
            _ => config_level.to_string(),
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ghost").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ghost").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_chat() {
        let args = CliArgs::try_parse_from(["ghost"]).unwrap();
        assert_eq!(args.command(), Command::Chat { in_memory: None });
        assert!(args.redis_url.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "ghost",
            "load",
            "--input",
            "corpus.json",
            "--redis-url",
            "redis://10.0.0.2:6380",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(
            args.command(),
            Command::Load {
                input: Some(PathBuf::from("corpus.json"))
            }
        );
        assert_eq!(args.redis_url.as_deref(), Some("redis://10.0.0.2:6380"));
        assert_eq!(args.resolve_log_filter("warn"), "debug");
    }

    #[test]
    fn test_embed_paths() {
        let args =
            CliArgs::try_parse_from(["ghost", "embed", "-i", "raw.json", "-o", "out.json"]).unwrap();
        assert_eq!(
            args.command(),
            Command::Embed {
                input: Some(PathBuf::from("raw.json")),
                output: Some(PathBuf::from("out.json")),
            }
        );
    }

    #[test]
    fn test_chat_in_memory() {
        let args = CliArgs::try_parse_from(["ghost", "chat", "--in-memory", "e.json"]).unwrap();
        assert_eq!(
            args.command(),
            Command::Chat {
                in_memory: Some(PathBuf::from("e.json"))
            }
        );
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::try_parse_from(["ghost", "--config", "/tmp/ghost.toml"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/ghost.toml"));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(CliArgs::try_parse_from(["ghost", "serve"]).is_err());
    }
}
