//! Server configuration from CLI flags and environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fibserv_orchestration::EngineConfig;

/// fibserv — Fibonacci terms over HTTP with cooperative scheduling.
#[derive(Parser, Debug)]
#[command(name = "fibserv-server", version, about)]
pub struct AppConfig {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1", env = "FIBSERV_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value = "8880", env = "FIBSERV_PORT")]
    pub port: u16,

    /// Requested cooperative yield interval for decomposable algorithms.
    #[arg(long, default_value = "1000", env = "FIBSERV_YIELD_INTERVAL")]
    pub yield_interval: u64,

    /// File to write the server pid to.
    #[arg(long, env = "FIBSERV_PID_FILE")]
    pub pid_file: Option<PathBuf>,

    /// Executable re-invoked for process-isolated algorithms. Defaults
    /// to this binary.
    #[arg(long)]
    pub worker_exe: Option<PathBuf>,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Compute one term, print it to stdout, and exit. The process
    /// isolation path re-invokes this binary in this mode.
    #[command(hide = true)]
    Worker {
        /// Algorithm name.
        algorithm: String,
        /// Term index.
        n: u64,
    },
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The engine configuration this server config implies.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            yield_interval: self.yield_interval,
            worker_exe: self.worker_exe.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = <AppConfig as Parser>::parse_from(["fibserv-server"]);
        assert_eq!(config.port, 8880);
        assert_eq!(config.yield_interval, 1_000);
        assert!(config.pid_file.is_none());
        assert!(config.mode.is_none());
    }

    #[test]
    fn worker_subcommand() {
        let config =
            <AppConfig as Parser>::parse_from(["fibserv-server", "worker", "naive", "20"]);
        match config.mode {
            Some(Mode::Worker { algorithm, n }) => {
                assert_eq!(algorithm, "naive");
                assert_eq!(n, 20);
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn engine_config_carries_interval() {
        let config = <AppConfig as Parser>::parse_from([
            "fibserv-server",
            "--yield-interval",
            "250",
        ]);
        assert_eq!(config.engine_config().yield_interval, 250);
    }
}
