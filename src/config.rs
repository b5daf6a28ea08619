//! Command-line and environment configuration
//!
//! Flags pick the source; the environment carries deployment settings:
//!
//! | Variable            | Meaning                                        |
//! |---------------------|------------------------------------------------|
//! | `RECALL_SERVER`     | Ingest URL (required)                          |
//! | `RECALL_SECRETS`    | Comma-separated env var names to redact        |
//! | `RECALL_TIMEOUT_MS` | Per-delivery timeout in milliseconds (5000)    |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::error::{RecallError, Result};
use crate::scrubber::EnvSecrets;
use crate::source::acp::DEFAULT_MAX_LINE_BYTES;
use crate::source::{AcpConfig, AcpSource, LogSource, Source};
use crate::transmitter::DEFAULT_TIMEOUT;

pub const ENV_SERVER: &str = "RECALL_SERVER";
pub const ENV_SECRETS: &str = "RECALL_SECRETS";
pub const ENV_TIMEOUT_MS: &str = "RECALL_TIMEOUT_MS";

#[derive(Debug, Parser)]
#[command(
    name = "a3s-recall",
    version,
    about = "Capture, scrub, and ship agent protocol traffic",
    after_help = "Example:\n  RECALL_SERVER=https://recall.example/ingest a3s-recall --agent claude-code-acp -- --verbose"
)]
pub struct Cli {
    /// Capture source: acp or log
    #[arg(long, default_value = "acp")]
    pub source: String,

    /// Agent binary to proxy (acp source)
    #[arg(long)]
    pub agent: Option<String>,

    /// File to read (log source)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Lines longer than this are forwarded but not captured
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Agent arguments, after `--`
    #[arg(last = true)]
    pub agent_args: Vec<String>,
}

/// Which source to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Acp,
    Log,
}

impl FromStr for SourceKind {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acp" => Ok(Self::Acp),
            "log" => Ok(Self::Log),
            other => Err(RecallError::Config(format!(
                "unknown source '{other}' (expected acp or log)"
            ))),
        }
    }
}

/// Validated source settings
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Acp(AcpConfig),
    Log { path: PathBuf },
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Acp(_) => SourceKind::Acp,
            Self::Log { .. } => SourceKind::Log,
        }
    }

    /// Build the configured source, proxying on process stdio for ACP
    pub fn build(&self) -> Arc<dyn Source> {
        match self {
            Self::Acp(config) => Arc::new(AcpSource::new(config.clone())),
            Self::Log { path } => Arc::new(LogSource::new(path.clone())),
        }
    }
}

/// Fully validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    /// Ingest endpoint
    pub server_url: String,
    /// Env var names whose values are redacted literally
    pub secret_names: Vec<String>,
    pub timeout: Duration,
}

impl Config {
    /// Validate CLI flags against the environment
    ///
    /// `lookup` reads an environment variable; pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn from_cli<F>(cli: Cli, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match cli.source.parse::<SourceKind>()? {
            SourceKind::Acp => {
                let agent_args: Vec<String> = cli.agent.into_iter().chain(cli.agent_args).collect();
                if agent_args.is_empty() {
                    return Err(RecallError::Config(
                        "no agent command specified (use --agent <binary> or -- <binary> [args...])"
                            .to_string(),
                    ));
                }
                let acp = AcpConfig::new(agent_args).with_max_line_bytes(cli.max_line_bytes);
                SourceConfig::Acp(acp)
            }
            SourceKind::Log => {
                let path = cli.file.ok_or_else(|| {
                    RecallError::Config("log source requires --file <path>".to_string())
                })?;
                SourceConfig::Log { path }
            }
        };

        let server_url = lookup(ENV_SERVER)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RecallError::Config(format!("{ENV_SERVER} must be set")))?;

        let secret_names = lookup(ENV_SECRETS)
            .map(|raw| parse_secret_names(&raw))
            .unwrap_or_default();

        let timeout = match lookup(ENV_TIMEOUT_MS) {
            None => DEFAULT_TIMEOUT,
            Some(raw) => parse_timeout_ms(&raw)?,
        };

        Ok(Self {
            source,
            server_url,
            secret_names,
            timeout,
        })
    }

    /// Resolve the declared secret names into a literal matcher
    pub fn env_secrets<F>(&self, lookup: F) -> Result<EnvSecrets>
    where
        F: Fn(&str) -> Option<String>,
    {
        EnvSecrets::new(resolve_env_secrets(&self.secret_names, lookup))
    }
}

/// Split a comma-separated list of names, trimming and dropping empties
pub fn parse_secret_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Look up each name; unset and empty values are skipped
pub fn resolve_env_secrets<F>(names: &[String], lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| {
            let value = lookup(name).filter(|v| !v.is_empty());
            if value.is_none() {
                tracing::debug!(name = %name, "Declared secret is not set");
            }
            value.map(|v| (name.clone(), v))
        })
        .collect()
}

fn parse_timeout_ms(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(RecallError::Config(format!(
            "{ENV_TIMEOUT_MS} must be a positive integer, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("a3s-recall").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_agent_flag_and_trailing_args() {
        let cli = parse(&["--agent", "claude-code-acp", "--", "--model", "opus"]);
        let config = Config::from_cli(cli, env(&[(ENV_SERVER, "http://localhost:8080")])).unwrap();

        match &config.source {
            SourceConfig::Acp(acp) => {
                assert_eq!(acp.agent_args, vec!["claude-code-acp", "--model", "opus"]);
                assert_eq!(acp.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
            }
            other => panic!("expected acp, got {other:?}"),
        }
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.secret_names.is_empty());
    }

    #[test]
    fn test_binary_after_separator() {
        let cli = parse(&["--", "gemini", "--experimental-acp"]);
        let config = Config::from_cli(cli, env(&[(ENV_SERVER, "http://x")])).unwrap();
        match config.source {
            SourceConfig::Acp(acp) => {
                assert_eq!(acp.agent_args, vec!["gemini", "--experimental-acp"])
            }
            other => panic!("expected acp, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_agent_is_config_error() {
        let err = Config::from_cli(parse(&[]), env(&[(ENV_SERVER, "http://x")])).unwrap_err();
        assert!(matches!(err, RecallError::Config(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_server_is_config_error() {
        let cli = parse(&["--agent", "agent"]);
        let err = Config::from_cli(cli, env(&[])).unwrap_err();
        assert!(err.to_string().contains(ENV_SERVER));

        let cli = parse(&["--agent", "agent"]);
        assert!(Config::from_cli(cli, env(&[(ENV_SERVER, "  ")])).is_err());
    }

    #[test]
    fn test_unknown_source_is_config_error() {
        let cli = parse(&["--source", "pcap", "--agent", "agent"]);
        let err = Config::from_cli(cli, env(&[(ENV_SERVER, "http://x")])).unwrap_err();
        assert!(matches!(err, RecallError::Config(_)));
        assert!(err.to_string().contains("pcap"));
    }

    #[test]
    fn test_log_source_requires_file() {
        let cli = parse(&["--source", "log"]);
        assert!(Config::from_cli(cli, env(&[(ENV_SERVER, "http://x")])).is_err());

        let cli = parse(&["--source", "log", "--file", "/var/log/agent.log"]);
        let config = Config::from_cli(cli, env(&[(ENV_SERVER, "http://x")])).unwrap();
        assert_eq!(config.source.kind(), SourceKind::Log);
        assert_eq!(config.source.build().name(), "log");
    }

    #[test]
    fn test_timeout_override() {
        let lookup = env(&[(ENV_SERVER, "http://x"), (ENV_TIMEOUT_MS, "250")]);
        let config = Config::from_cli(parse(&["--agent", "a"]), lookup).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));

        for bad in ["0", "soon", "-5"] {
            let lookup = env(&[(ENV_SERVER, "http://x"), (ENV_TIMEOUT_MS, bad)]);
            assert!(Config::from_cli(parse(&["--agent", "a"]), lookup).is_err());
        }
    }

    #[test]
    fn test_max_line_bytes_flag() {
        let cli = parse(&["--max-line-bytes", "1024", "--agent", "a"]);
        let config = Config::from_cli(cli, env(&[(ENV_SERVER, "http://x")])).unwrap();
        match config.source {
            SourceConfig::Acp(acp) => assert_eq!(acp.max_line_bytes, 1024),
            other => panic!("expected acp, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_secret_names() {
        assert_eq!(
            parse_secret_names(" DB_PASS, ,API_TOKEN ,,"),
            vec!["DB_PASS", "API_TOKEN"]
        );
        assert!(parse_secret_names("").is_empty());
    }

    #[test]
    fn test_env_secrets_resolution() {
        let lookup = env(&[
            (ENV_SERVER, "http://x"),
            (ENV_SECRETS, "DB_PASS,EMPTY,UNSET,SHORT"),
            ("DB_PASS", "hunter2-prod"),
            ("EMPTY", ""),
            ("SHORT", "abc"),
        ]);
        let config = Config::from_cli(parse(&["--agent", "a"]), &lookup).unwrap();
        assert_eq!(config.secret_names, vec!["DB_PASS", "EMPTY", "UNSET", "SHORT"]);

        let resolved = resolve_env_secrets(&config.secret_names, &lookup);
        assert_eq!(
            resolved,
            vec![
                ("DB_PASS".to_string(), "hunter2-prod".to_string()),
                ("SHORT".to_string(), "abc".to_string()),
            ]
        );

        let secrets = config.env_secrets(&lookup).unwrap();
        assert_eq!(secrets.names(), vec!["DB_PASS"]);
        assert_eq!(secrets.scrub("pw=hunter2-prod"), "pw=<ENV:DB_PASS>");
    }
}
