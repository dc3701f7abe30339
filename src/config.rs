use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "codejudge", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Number of judging workers
    #[arg(long = "threads", short = 't', default_value_t = 2)]
    pub threads: u8,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    pub database_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Settings for running and judging submitted programs
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JudgeConfig {
    /// Interpreter executable, resolved through `PATH`
    pub interpreter: String,
    /// Extra arguments placed before the source file path
    pub interpreter_args: Vec<String>,
    /// Name of the source file written into each scratch directory
    pub source_file_name: String,
    /// Wall-clock limit for one testcase
    pub time_limit: MilliSecond,
    /// Accepted for compatibility, never enforced
    pub memory_limit: MegaByte,
    /// Per-stream capture limit, in characters
    pub max_output_chars: usize,
    /// Parent directory of the per-attempt scratch directories
    pub scratch_root: Option<PathBuf>,
    pub execution_enabled: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: Vec::new(),
            source_file_name: "solution.py".to_string(),
            time_limit: MilliSecond(2000),
            memory_limit: MegaByte(256),
            max_output_chars: 10_000,
            scratch_root: None,
            execution_enabled: true,
        }
    }
}

impl JudgeConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("codejudge"))
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MegaByte(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.judge.interpreter, "python3");
        assert_eq!(config.judge.time_limit, MilliSecond(2000));
        assert_eq!(Duration::from(config.judge.time_limit), Duration::from_secs(2));
    }

    #[test]
    fn test_judge_defaults_fill_missing_keys() {
        let config: Config =
            serde_json::from_str(r#"{ "judge": { "interpreter": "pypy3" } }"#).unwrap();
        assert_eq!(config.judge.interpreter, "pypy3");
        assert_eq!(config.judge.source_file_name, "solution.py");
        assert_eq!(config.judge.max_output_chars, 10_000);
        assert_eq!(config.judge.memory_limit, MegaByte(256));
        assert!(config.judge.execution_enabled);
        assert!(config.server.bind_port.is_none());
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_scratch_root_falls_back_to_temp_dir() {
        let judge = JudgeConfig::default();
        assert_eq!(judge.scratch_root(), std::env::temp_dir().join("codejudge"));
    }
}
