use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_WINDOW_SIZE: u16 = 1;
pub const DEFAULT_INITIAL_TIMEOUT_MS: u64 = 1000;

/// Where protocol event lines go: the console for the literal `stdout`,
/// otherwise a file opened in append mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl From<String> for LogTarget {
    fn from(value: String) -> Self {
        if value == "stdout" {
            LogTarget::Stdout
        } else {
            LogTarget::File(PathBuf::from(value))
        }
    }
}

impl From<LogTarget> for String {
    fn from(value: LogTarget) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTarget::Stdout => f.write_str("stdout"),
            LogTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub input: PathBuf,
    pub dest_ip: IpAddr,
    pub dest_port: u16,
    /// Local TCP port the receiver connects back to with acknowledgments.
    pub ack_port: u16,
    pub log: LogTarget,
    #[serde(default = "default_window_size")]
    pub window_size: u16,
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub output: PathBuf,
    pub listen_port: u16,
    pub sender_ip: IpAddr,
    pub ack_port: u16,
    pub log: LogTarget,
}

fn default_window_size() -> u16 {
    DEFAULT_WINDOW_SIZE
}

fn default_initial_timeout_ms() -> u64 {
    DEFAULT_INITIAL_TIMEOUT_MS
}

/// Fault model of the simulated link. Latencies are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_target_parses_stdout_literal() {
        assert_eq!("stdout".parse::<LogTarget>().unwrap(), LogTarget::Stdout);
        assert_eq!(
            "sender.log".parse::<LogTarget>().unwrap(),
            LogTarget::File(PathBuf::from("sender.log"))
        );
    }

    #[test]
    fn sender_config_defaults_window_and_timeout() {
        let cfg: SenderConfig = toml::from_str(
            r#"
            input = "in.bin"
            dest_ip = "127.0.0.1"
            dest_port = 4119
            ack_port = 4118
            log = "stdout"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(cfg.initial_timeout_ms, DEFAULT_INITIAL_TIMEOUT_MS);
        assert_eq!(cfg.log, LogTarget::Stdout);
    }
}
