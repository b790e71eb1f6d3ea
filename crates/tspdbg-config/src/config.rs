use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tspdbg_stream::Markers;

/// Log verbosity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Name accepted by an `EnvFilter` directive.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where log records go.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Log file; the per-user default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// How the debugger child process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    /// Executable speaking the `.debug` protocol on stdin/stdout.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// How long a caller waits for a stack snapshot.
    #[serde(default = "default_stack_timeout_ms")]
    pub stack_timeout_ms: u64,
}

fn default_command() -> String {
    "kic-debug".to_string()
}

fn default_stack_timeout_ms() -> u64 {
    5000
}

impl DebuggerConfig {
    pub fn stack_timeout(&self) -> Duration {
        Duration::from_millis(self.stack_timeout_ms)
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            stack_timeout_ms: default_stack_timeout_ms(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debugger: DebuggerConfig,
    /// Stream markers; any marker left out keeps its built-in value.
    #[serde(default)]
    pub markers: Markers,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.debugger.command, "kic-debug");
        assert!(cfg.debugger.args.is_empty());
        assert_eq!(cfg.debugger.stack_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.markers, Markers::default());
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let cfg: Config = toml::from_str(
            "[debugger]\nargs = [\"--port\", \"5025\"]\n\n[markers]\nprompt = \"KIC>\"\n",
        )
        .unwrap();
        assert_eq!(cfg.debugger.command, "kic-debug");
        assert_eq!(cfg.debugger.args, vec!["--port", "5025"]);
        assert_eq!(cfg.markers.prompt, "KIC>");
        assert_eq!(cfg.markers.channel_tag, "dbg");
    }

    #[test]
    fn log_level_names() {
        let cfg: Config = toml::from_str("[log]\nlevel = \"warn\"\nfile = \"/tmp/d.log\"\n").unwrap();
        assert_eq!(cfg.log.level, LogLevel::Warn);
        assert_eq!(cfg.log.level.as_str(), "warn");
        assert_eq!(cfg.log.file, Some(PathBuf::from("/tmp/d.log")));
        assert!(toml::from_str::<Config>("[log]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn serializes_back_to_toml() {
        let text = toml::to_string(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }
}
