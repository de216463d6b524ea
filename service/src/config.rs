use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default directory for raw audio backups of transcription sessions.
pub const DEFAULT_TRANSCRIPTION_BACKUP_DIR: &str = "./recordings";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
    Test,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            "test" => Ok(RustEnv::Test),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
            RustEnv::Test => write!(f, "test"),
        }
    }
}

/// Which cache backing the AI orchestrator uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStrategy {
    Memory,
    Hybrid,
}

impl FromStr for CacheStrategy {
    type Err = String;
    fn from_str(value: &str) -> Result<CacheStrategy, Self::Err> {
        match value.to_lowercase().as_str() {
            "memory" => Ok(CacheStrategy::Memory),
            "hybrid" => Ok(CacheStrategy::Hybrid),
            other => Err(format!("unknown cache strategy: {other}")),
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CacheStrategy::Memory => write!(f, "memory"),
            CacheStrategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use. The test environment disables
    /// AI result caching, debouncing and retries.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING", "TEST",
        "development", "production", "staging", "test"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Timeout in seconds for each text generation attempt
    #[arg(long, env, default_value_t = 30)]
    pub ai_timeout_secs: u64,

    /// Timeout in seconds for each transcription attempt
    #[arg(long, env, default_value_t = 15)]
    pub transcription_timeout_secs: u64,

    /// Cache AI results for repeated identical inputs
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub ai_cache_enabled: bool,

    /// Cache backing: `memory` or `hybrid` (small front tier over a larger store)
    #[arg(long, env, default_value_t = CacheStrategy::Memory)]
    pub ai_cache_strategy: CacheStrategy,

    /// Maximum number of cached AI results
    #[arg(long, env, default_value_t = 500)]
    pub ai_cache_max_size: usize,

    /// Size of the front tier when the hybrid strategy is used
    #[arg(long, env, default_value_t = 100)]
    pub ai_cache_front_size: usize,

    /// Seconds a note analysis result stays cached
    #[arg(long, env, default_value_t = 1800)]
    pub cache_ttl_analyze_secs: u64,

    /// Seconds a coaching result stays cached
    #[arg(long, env, default_value_t = 900)]
    pub cache_ttl_coach_secs: u64,

    /// Seconds a chat reply stays cached
    #[arg(long, env, default_value_t = 300)]
    pub cache_ttl_chat_secs: u64,

    /// Seconds a methodology insight stays cached
    #[arg(long, env, default_value_t = 3600)]
    pub cache_ttl_methodology_secs: u64,

    /// Seconds a follow-up question set stays cached
    #[arg(long, env, default_value_t = 900)]
    pub cache_ttl_follow_up_secs: u64,

    /// Seconds a summary stays cached
    #[arg(long, env, default_value_t = 1800)]
    pub cache_ttl_summary_secs: u64,

    /// Seconds a cleaned transcript stays cached
    #[arg(long, env, default_value_t = 3600)]
    pub cache_ttl_cleanup_secs: u64,

    /// Coalesce rapid near-duplicate AI calls
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub ai_debounce_enabled: bool,

    /// Similarity (0.0-1.0) at or above which debounced input counts as unchanged
    #[arg(long, env, default_value_t = 0.95)]
    pub debounce_similarity_threshold: f64,

    /// Debounce window in milliseconds for note analysis
    #[arg(long, env, default_value_t = 2000)]
    pub debounce_analyze_ms: u64,

    /// Debounce window in milliseconds for coaching
    #[arg(long, env, default_value_t = 1500)]
    pub debounce_coach_ms: u64,

    /// Debounce window in milliseconds for chat
    #[arg(long, env, default_value_t = 500)]
    pub debounce_chat_ms: u64,

    /// Debounce window in milliseconds for methodology insights
    #[arg(long, env, default_value_t = 2000)]
    pub debounce_methodology_ms: u64,

    /// Debounce window in milliseconds for follow-up questions
    #[arg(long, env, default_value_t = 1000)]
    pub debounce_follow_up_ms: u64,

    /// Retries after the first attempt for text operations
    #[arg(long, env, default_value_t = 3)]
    pub retry_max_retries: u32,

    /// Base backoff delay in milliseconds for text operations
    #[arg(long, env, default_value_t = 2000)]
    pub retry_base_delay_ms: u64,

    /// Base backoff delay in milliseconds for chat (kept short for responsiveness)
    #[arg(long, env, default_value_t = 500)]
    pub chat_retry_base_delay_ms: u64,

    /// Backoff multiplier applied per retry
    #[arg(long, env, default_value_t = 2.0)]
    pub retry_backoff_multiplier: f64,

    /// Upper bound in milliseconds for any single backoff delay
    #[arg(long, env, default_value_t = 30000)]
    pub retry_max_delay_ms: u64,

    /// Maximum random jitter in milliseconds added to each backoff delay
    #[arg(long, env, default_value_t = 250)]
    pub retry_jitter_ms: u64,

    /// Retries after the first attempt for transcription (time-sensitive)
    #[arg(long, env, default_value_t = 2)]
    pub transcription_max_retries: u32,

    /// Consecutive failures that open an operation's circuit breaker (0 disables)
    #[arg(long, env, default_value_t = 5)]
    pub circuit_breaker_threshold: u32,

    /// Seconds an open circuit breaker waits before admitting a probe call
    #[arg(long, env, default_value_t = 60)]
    pub circuit_breaker_cooldown_secs: u64,

    /// Milliseconds between background scans for stale session buffers
    #[arg(long, env, default_value_t = 2000)]
    pub transcription_flush_interval_ms: u64,

    /// Milliseconds since the last flush after which buffered audio is flushed
    #[arg(long, env, default_value_t = 4000)]
    pub transcription_flush_threshold_ms: u64,

    /// Consecutive failed flushes before a session stops attempting transcription
    #[arg(long, env, default_value_t = 3)]
    pub transcription_failure_threshold: u32,

    /// Directory where raw session audio is backed up
    #[arg(long, env, default_value = DEFAULT_TRANSCRIPTION_BACKUP_DIR)]
    pub transcription_backup_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Parse from an explicit argument list (first item is the binary name)
    /// instead of the process arguments. Environment variables still apply.
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::try_parse_from(args)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_test(&self) -> bool {
        self.runtime_env() == RustEnv::Test
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["service"];
        argv.extend_from_slice(args);
        Config::try_from_args(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--runtime-env", "development"]);
        assert_eq!(config.debounce_similarity_threshold, 0.95);
        assert_eq!(config.transcription_failure_threshold, 3);
        assert_eq!(config.transcription_max_retries, 2);
        assert!(config.chat_retry_base_delay_ms < config.retry_base_delay_ms);
        assert!(config.debounce_chat_ms < config.debounce_analyze_ms);
    }

    #[test]
    fn test_runtime_env_parsing() {
        assert_eq!("TEST".parse::<RustEnv>(), Ok(RustEnv::Test));
        assert_eq!("Production".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));

        let config = parse(&["--runtime-env", "test"]);
        assert!(config.is_test());
        assert!(!parse(&["--runtime-env", "production"]).is_test());
    }

    #[test]
    fn test_flag_overrides() {
        let config = parse(&[
            "--ai-cache-enabled",
            "false",
            "--ai-cache-strategy",
            "hybrid",
            "--circuit-breaker-threshold",
            "2",
            "--transcription-backup-dir",
            "/tmp/backups",
        ]);
        assert!(!config.ai_cache_enabled);
        assert_eq!(config.ai_cache_strategy, CacheStrategy::Hybrid);
        assert_eq!(config.circuit_breaker_threshold, 2);
        assert_eq!(config.transcription_backup_dir, PathBuf::from("/tmp/backups"));
    }

    #[test]
    fn test_cache_strategy_round_trip_names() {
        assert_eq!("MEMORY".parse::<CacheStrategy>(), Ok(CacheStrategy::Memory));
        assert_eq!(CacheStrategy::Hybrid.to_string(), "hybrid");
        assert!("redis".parse::<CacheStrategy>().is_err());
    }
}
