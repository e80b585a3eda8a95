//! Startup configuration: command line flags and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::backend::{BackendKind, Driver};
use crate::core::pacer::RateConfig;

pub const ENV_BACKEND: &str = "WINDOWS_MCP_INPUT_BACKEND";
pub const ENV_DRIVER: &str = "WINDOWS_MCP_INPUT_DRIVER";
pub const ENV_MOVE_HZ: &str = "WINDOWS_MCP_RATE_MOVE_HZ";
pub const ENV_MAX_DELTA: &str = "WINDOWS_MCP_RATE_MAX_DELTA";
pub const ENV_SMOOTH: &str = "WINDOWS_MCP_RATE_SMOOTH";
pub const ENV_CPS: &str = "WINDOWS_MCP_RATE_CPS";
pub const ENV_KPS: &str = "WINDOWS_MCP_RATE_KPS";
pub const ENV_SCROLL_HZ: &str = "WINDOWS_MCP_RATE_SCROLL_HZ";
pub const ENV_LOG_LEVEL: &str = "WINDOWS_INPUT_LOG_LEVEL";
pub const ENV_IBSIM_DIR: &str = "IBSIM_DIR";
pub const ENV_AUTOHOTKEY: &str = "AUTOHOTKEY_EXE";

/// Variables that shape runtime behaviour, in display order
pub const ENV_VARS: [&str; 11] = [
    ENV_BACKEND,
    ENV_DRIVER,
    ENV_MOVE_HZ,
    ENV_MAX_DELTA,
    ENV_SMOOTH,
    ENV_CPS,
    ENV_KPS,
    ENV_SCROLL_HZ,
    ENV_LOG_LEVEL,
    ENV_IBSIM_DIR,
    ENV_AUTOHOTKEY,
];

/// How the MCP server talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout
    Stdio,
    /// Served on the streamable HTTP endpoint, which also streams SSE
    Sse,
    /// Streamable HTTP at `/mcp`
    StreamableHttp,
}

/// Windows mouse and keyboard input over MCP, paced per input class
#[derive(Debug, Parser)]
#[command(name = "windows-input-mcp", version, about)]
pub struct Cli {
    /// The transport layer used by the MCP server
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Host to bind the SSE/streamable HTTP server
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to bind the SSE/streamable HTTP server
    #[arg(long, default_value_t = 8001)]
    pub port: u16,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Parse { var: &'static str, reason: String },

    #[error("invalid rate limiter settings: {0}")]
    Rate(String),
}

/// Everything the server reads at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub driver: Driver,
    pub rate: RateConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    pub ibsim_dir: Option<PathBuf>,
    pub autohotkey_exe: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::IbsimDll,
            driver: Driver::AnyDriver,
            rate: RateConfig::default(),
            log_level: "info".into(),
            ibsim_dir: None,
            autohotkey_exe: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build settings from `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let backend = parse_or(get(ENV_BACKEND), ENV_BACKEND, defaults.backend)?;
        let driver = parse_or(get(ENV_DRIVER), ENV_DRIVER, defaults.driver)?;

        let base = defaults.rate;
        let rate = RateConfig {
            move_hz: parse_or(get(ENV_MOVE_HZ), ENV_MOVE_HZ, base.move_hz)?,
            max_delta: parse_or(get(ENV_MAX_DELTA), ENV_MAX_DELTA, base.max_delta)?,
            smooth: parse_or(get(ENV_SMOOTH), ENV_SMOOTH, base.smooth)?,
            cps: parse_or(get(ENV_CPS), ENV_CPS, base.cps)?,
            kps: parse_or(get(ENV_KPS), ENV_KPS, base.kps)?,
            scroll_hz: parse_or(get(ENV_SCROLL_HZ), ENV_SCROLL_HZ, base.scroll_hz)?,
        };
        rate.validate().map_err(|e| ConfigError::Rate(e.to_string()))?;

        Ok(Self {
            backend,
            driver,
            rate,
            log_level: get(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            ibsim_dir: get(ENV_IBSIM_DIR).map(PathBuf::from),
            autohotkey_exe: get(ENV_AUTOHOTKEY).map(PathBuf::from),
        })
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Parse {
            var,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.backend, BackendKind::IbsimDll);
        assert_eq!(s.driver, Driver::AnyDriver);
        assert_eq!(s.rate, RateConfig::default());
        assert_eq!(s.log_level, "info");
        assert!(s.ibsim_dir.is_none());
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            (ENV_BACKEND, "dry-run"),
            (ENV_DRIVER, "Logitech"),
            (ENV_MOVE_HZ, "240"),
            (ENV_MAX_DELTA, "25"),
            (ENV_SMOOTH, "0.4"),
            (ENV_KPS, " 20 "),
            (ENV_IBSIM_DIR, "C:/tools/IbInputSimulator"),
        ])
        .unwrap();
        assert_eq!(s.backend, BackendKind::DryRun);
        assert_eq!(s.driver, Driver::Logitech);
        assert_eq!(s.rate.move_hz, 240.0);
        assert_eq!(s.rate.max_delta, 25);
        assert_eq!(s.rate.smooth, 0.4);
        assert_eq!(s.rate.kps, 20.0);
        assert_eq!(s.rate.cps, 8.0);
        assert_eq!(s.ibsim_dir, Some(PathBuf::from("C:/tools/IbInputSimulator")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            settings(&[(ENV_CPS, "fast")]),
            Err(ConfigError::Parse { var: ENV_CPS, .. })
        ));
        assert!(matches!(
            settings(&[(ENV_MAX_DELTA, "-3")]),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            settings(&[(ENV_MOVE_HZ, "0")]),
            Err(ConfigError::Rate(_))
        ));
        assert!(matches!(
            settings(&[(ENV_SMOOTH, "1.5")]),
            Err(ConfigError::Rate(_))
        ));
        assert!(matches!(
            settings(&[(ENV_BACKEND, "pyautogui")]),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn blank_values_fall_back() {
        let s = settings(&[(ENV_BACKEND, "  "), (ENV_LOG_LEVEL, "")]).unwrap();
        assert_eq!(s.backend, BackendKind::IbsimDll);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn cli_defaults_to_stdio() {
        let cli = Cli::try_parse_from(["windows-input-mcp"]).unwrap();
        assert_eq!(cli.transport, Transport::Stdio);
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.port, 8001);
    }

    #[test]
    fn cli_selects_http_transports() {
        let cli = Cli::try_parse_from([
            "windows-input-mcp",
            "--transport",
            "streamable-http",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .unwrap();
        assert_eq!(cli.transport, Transport::StreamableHttp);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 9000);

        let cli = Cli::try_parse_from(["windows-input-mcp", "--transport", "sse"]).unwrap();
        assert_eq!(cli.transport, Transport::Sse);
    }

    #[test]
    fn cli_rejects_unknown_values() {
        assert!(Cli::try_parse_from(["windows-input-mcp", "--transport", "websocket"]).is_err());
        assert!(Cli::try_parse_from(["windows-input-mcp", "--port", "70000"]).is_err());
    }
}
