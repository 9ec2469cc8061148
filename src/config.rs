use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::cli::{Args, LogFormat, LogLevel};
use crate::error::{FetchError, Result, WithContext};
use crate::retry::RetryPolicy;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_USER_AGENT: &str = concat!("resget/", env!("CARGO_PKG_VERSION"));

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(30),
            write: Duration::from_secs(10),
        }
    }
}

impl Timeouts {
    /// Total deadline for a buffered request: sending plus waiting for the
    /// reply. reqwest's blocking client has no separate read/write knobs.
    pub fn request_deadline(&self) -> Duration {
        self.read.saturating_add(self.write)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("connect", self.connect), ("read", self.read), ("write", self.write)] {
            if value.is_zero() {
                return Err(FetchError::config(format!("{} timeout must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

/// Settings fixed at client construction and shared by every operation.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
    pub chunk_size: usize,
    /// Extra default headers as "Name: value" strings.
    pub headers: Vec<String>,
    pub user_agent: String,
    /// netrc file consulted for Basic credentials.
    pub netrc: Option<PathBuf>,
    /// Total deadline for streamed downloads; `None` lets them run as long as
    /// data keeps arriving.
    pub download_timeout: Option<Duration>,
    pub show_progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            headers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            netrc: None,
            download_timeout: None,
            show_progress: false,
        }
    }
}

impl ClientConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;
        self.retry.validate()?;
        if self.chunk_size == 0 {
            return Err(FetchError::config("chunk size must be at least 1 byte".to_string()));
        }
        if matches!(self.download_timeout, Some(d) if d.is_zero()) {
            return Err(FetchError::config("download timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Contents of `~/.resgetrc`.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub headers: Option<Vec<String>>,
    pub netrc: Option<bool>,
    pub retry: Option<RetryConfig>,
    pub timeouts: Option<TimeoutConfig>,
    pub download: Option<DownloadConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RetryConfig {
    pub max: Option<u32>,
    pub base_ms: Option<u64>,
    pub factor: Option<f64>,
    pub jitter_ms: Option<u64>,
    pub statuses: Option<Vec<u16>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimeoutConfig {
    pub connect_ms: Option<u64>,
    pub read_ms: Option<u64>,
    pub write_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DownloadConfig {
    pub chunk_size: Option<usize>,
    pub resume: Option<bool>,
    pub jobs: Option<usize>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    pub format: Option<String>,
    pub level: Option<String>,
    pub quiet: Option<bool>,
    pub verbose: Option<bool>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .with_context(|| "reading HOME environment variable for config".to_string())?;
        Ok(PathBuf::from(home).join(".resgetrc"))
    }

    /// Load `~/.resgetrc` with error propagation; a missing file is not an error
    pub fn load_from_file() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Fill every option the command line left unset. Flags win.
    pub fn merge_with_args(&self, args: &mut Args) -> Result<()> {
        if let Some(retry) = &self.retry {
            args.max_retries = args.max_retries.or(retry.max);
            args.backoff_base_ms = args.backoff_base_ms.or(retry.base_ms);
            args.backoff_factor = args.backoff_factor.or(retry.factor);
            args.jitter_ms = args.jitter_ms.or(retry.jitter_ms);
            if args.retry_statuses.is_empty() {
                args.retry_statuses = retry.statuses.clone().unwrap_or_default();
            }
        }

        if let Some(timeouts) = &self.timeouts {
            args.connect_timeout_ms = args.connect_timeout_ms.or(timeouts.connect_ms);
            args.read_timeout_ms = args.read_timeout_ms.or(timeouts.read_ms);
            args.write_timeout_ms = args.write_timeout_ms.or(timeouts.write_ms);
        }

        if let Some(download) = &self.download {
            args.chunk_size = args.chunk_size.or(download.chunk_size);
            args.jobs = args.jobs.or(download.jobs);
            if !args.resume {
                args.resume = download.resume.unwrap_or(false);
            }
            if args.output_dir.is_none() {
                args.output_dir = download.output_dir.clone();
            }
        }

        if args.headers.is_empty() {
            args.headers = self.headers.clone().unwrap_or_default();
        }
        if !args.netrc {
            args.netrc = self.netrc.unwrap_or(false);
        }

        if let Some(logging) = &self.logging {
            if !args.quiet {
                args.quiet = logging.quiet.unwrap_or(false);
            }
            if !args.verbose {
                args.verbose = logging.verbose.unwrap_or(false);
            }
            if args.log_format.is_none() {
                args.log_format = logging.format.as_deref().map(parse_log_format).transpose()?;
            }
            if args.log_level.is_none() {
                args.log_level = logging.level.as_deref().map(parse_log_level).transpose()?;
            }
        }
        Ok(())
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat> {
    match value.to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        other => Err(FetchError::config(format!("unknown log format '{}'", other))),
    }
}

fn parse_log_level(value: &str) -> Result<LogLevel> {
    match value.to_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(FetchError::config(format!("unknown log level '{}'", other))),
    }
}
