// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! CLI flags, when present, take precedence over the matching environment
//! variable; both fall back to a documented default. A value that's set
//! but fails to parse is a fatal [`ConfigError`], never a silently-ignored
//! default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is set to {value:?}, which is not a valid {kind}")]
    Invalid { var: &'static str, kind: &'static str, value: String },
    #[error("tools directory is required: pass --tools-dir or set RELAY_TOOLS_DIR")]
    MissingToolsDir,
}

/// CLI-flag overrides accepted by [`Settings::load`]; fields left `None`
/// fall through to the matching environment variable and then a default.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub worker_port: Option<u16>,
    pub tools_dir: Option<PathBuf>,
    pub worker_runner: Option<String>,
}

/// Fully resolved daemon configuration, gathered once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub worker_port: u16,
    pub tools_dir: PathBuf,
    pub call_timeout: Duration,
    pub reload_debounce: Duration,
    pub drain_grace: Duration,
    pub worker_ready_timeout: Duration,
    pub restart_backoff_cap: Duration,
    pub restart_failure_threshold: (u32, Duration),
    pub worker_runner: String,
}

impl Settings {
    pub fn load(cli: CliOverrides) -> Result<Self, ConfigError> {
        let port = port(cli.port)?;
        Ok(Settings {
            port,
            worker_port: worker_port(cli.worker_port, port)?,
            tools_dir: tools_dir(cli.tools_dir)?,
            call_timeout: call_timeout()?,
            reload_debounce: reload_debounce()?,
            drain_grace: drain_grace()?,
            worker_ready_timeout: worker_ready_timeout()?,
            restart_backoff_cap: restart_backoff_cap()?,
            restart_failure_threshold: restart_failure_threshold()?,
            worker_runner: worker_runner(cli.worker_runner)?,
        })
    }
}

/// Executable used to run a namespace's source file as a worker
/// subprocess. `--worker-runner` > `RELAY_WORKER_RUNNER` > `node`.
pub fn worker_runner(cli: Option<String>) -> Result<String, ConfigError> {
    if let Some(r) = cli {
        return Ok(r);
    }
    Ok(std::env::var("RELAY_WORKER_RUNNER").unwrap_or_else(|_| "node".to_string()))
}

fn parse_env<T: FromStr>(var: &'static str, kind: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, kind, value }),
        Err(_) => Ok(None),
    }
}

fn duration_ms_env(var: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_env::<u64>(var, "duration in milliseconds")?.unwrap_or(default_ms)))
}

/// Client-facing WebSocket/HTTP port. `--port` > `RELAY_PORT` > `8787`.
pub fn port(cli: Option<u16>) -> Result<u16, ConfigError> {
    if let Some(p) = cli {
        return Ok(p);
    }
    Ok(parse_env::<u16>("RELAY_PORT", "port number")?.unwrap_or(8787))
}

/// Worker-facing WebSocket port. `--worker-port` > `RELAY_WORKER_PORT` > `port + 1`.
pub fn worker_port(cli: Option<u16>, client_port: u16) -> Result<u16, ConfigError> {
    if let Some(p) = cli {
        return Ok(p);
    }
    Ok(parse_env::<u16>("RELAY_WORKER_PORT", "port number")?.unwrap_or(client_port + 1))
}

/// Tools directory. `--tools-dir` > `RELAY_TOOLS_DIR`; no default, this is required.
pub fn tools_dir(cli: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = cli {
        return Ok(p);
    }
    std::env::var("RELAY_TOOLS_DIR").map(PathBuf::from).map_err(|_| ConfigError::MissingToolsDir)
}

/// Per-call deadline. Default 30s.
pub fn call_timeout() -> Result<Duration, ConfigError> {
    duration_ms_env("RELAY_CALL_TIMEOUT_MS", 30_000)
}

/// Filesystem-watcher debounce window. Default 300ms.
pub fn reload_debounce() -> Result<Duration, ConfigError> {
    duration_ms_env("RELAY_RELOAD_DEBOUNCE_MS", 300)
}

/// Grace period a draining worker is given to finish in-flight calls before
/// being killed outright. Default 30s.
pub fn drain_grace() -> Result<Duration, ConfigError> {
    duration_ms_env("RELAY_DRAIN_GRACE_MS", 30_000)
}

/// How long the supervisor waits for a spawned worker's `ready` frame
/// before treating the spawn as failed. Default 5s.
pub fn worker_ready_timeout() -> Result<Duration, ConfigError> {
    duration_ms_env("RELAY_WORKER_READY_MS", 5_000)
}

/// Cap on exponential restart backoff. Default 30s.
pub fn restart_backoff_cap() -> Result<Duration, ConfigError> {
    duration_ms_env("RELAY_RESTART_BACKOFF_CAP_MS", 30_000)
}

/// Failure-rate threshold before a namespace is marked broken: N restarts
/// within a rolling window. Default 5 within 60s.
pub fn restart_failure_threshold() -> Result<(u32, Duration), ConfigError> {
    let count = parse_env::<u32>("RELAY_RESTART_FAILURE_THRESHOLD", "integer")?.unwrap_or(5);
    Ok((count, Duration::from_secs(60)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cli_override_wins_over_env() {
        assert_eq!(port(Some(9999)).unwrap(), 9999);
    }

    #[test]
    #[serial(relay_config_env)]
    fn missing_env_falls_back_to_default() {
        std::env::remove_var("RELAY_PORT");
        assert_eq!(port(None).unwrap(), 8787);
    }

    #[test]
    #[serial(relay_config_env)]
    fn env_var_is_used_when_no_cli_override() {
        std::env::set_var("RELAY_PORT", "4000");
        assert_eq!(port(None).unwrap(), 4000);
        std::env::remove_var("RELAY_PORT");
    }

    #[test]
    #[serial(relay_config_env)]
    fn invalid_env_var_is_a_fatal_error() {
        std::env::set_var("RELAY_PORT", "not-a-port");
        assert!(port(None).is_err());
        std::env::remove_var("RELAY_PORT");
    }

    #[test]
    fn worker_port_defaults_to_client_port_plus_one() {
        assert_eq!(worker_port(None, 8787).unwrap(), 8788);
    }

    #[test]
    #[serial(relay_config_env)]
    fn missing_tools_dir_is_an_error() {
        std::env::remove_var("RELAY_TOOLS_DIR");
        assert!(matches!(tools_dir(None), Err(ConfigError::MissingToolsDir)));
    }

    #[test]
    fn tools_dir_cli_override_wins() {
        let path = tools_dir(Some(PathBuf::from("/tools"))).unwrap();
        assert_eq!(path, PathBuf::from("/tools"));
    }

    #[test]
    fn settings_load_resolves_worker_port_from_client_port() {
        let settings = Settings::load(CliOverrides {
            port: Some(9000),
            worker_port: None,
            tools_dir: Some(PathBuf::from("/tools")),
            worker_runner: None,
        })
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.worker_port, 9001);
        assert_eq!(settings.call_timeout, Duration::from_secs(30));
    }
}
