use clap::{Parser, ArgAction, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use crate::client::DownloadJob;
use crate::config::{ClientConfig, Timeouts, DEFAULT_CHUNK_SIZE};
use crate::error::{FetchError, Result, WithContext};
use crate::file_utils::load_urls_from_file;
use crate::http::get_fallback_filename;
use crate::output::{self, Logger};
use crate::retry::RetryPolicy;

/// Log output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

/// Log level options
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Debug level (most verbose)
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
}

impl From<LogLevel> for output::LogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => output::LogLevel::Debug,
            LogLevel::Info => output::LogLevel::Info,
            LogLevel::Warn => output::LogLevel::Warn,
            LogLevel::Error => output::LogLevel::Error,
        }
    }
}

/// Download files over HTTP with retries and resumable transfers
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "resget", version, about = "A resilient HTTP downloader")]
pub struct Args {
    /// One or more URLs to fetch
    pub urls: Vec<String>,

    /// File listing one "URL [DESTINATION]" per line
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output file path (only valid for a single URL)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory to save downloaded files into
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Custom headers ("Name: value")
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Continue partially downloaded files
    #[arg(long)]
    pub resume: bool,

    /// Maximum number of retries after the first attempt [default: 3]
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base delay for exponential backoff in milliseconds [default: 1000]
    #[arg(long)]
    pub backoff_base_ms: Option<u64>,

    /// Multiplier applied to the delay after every retry [default: 2.0]
    #[arg(long)]
    pub backoff_factor: Option<f64>,

    /// Upper bound of the random delay added to each backoff, in milliseconds [default: 0]
    #[arg(long)]
    pub jitter_ms: Option<u64>,

    /// Extra HTTP status to retry besides 5xx (repeatable)
    #[arg(long = "retry-status")]
    pub retry_statuses: Vec<u16>,

    /// Connect timeout in milliseconds [default: 5000]
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds [default: 30000]
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Write timeout in milliseconds [default: 10000]
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Bytes read from the network per chunk [default: 8192]
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Number of files downloaded at once [default: 1]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Use credentials from ~/.netrc
    #[arg(long)]
    pub netrc: bool,

    /// Verbose output
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Quiet mode
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file to read instead of ~/.resgetrc
    #[arg(long)]
    pub config: Option<String>,

    /// Create a default ~/.resgetrc config template
    #[arg(long)]
    pub init: bool,
}

impl Args {
    pub fn logger(&self) -> Logger {
        let json = matches!(self.log_format, Some(LogFormat::Json));
        let logger = Logger::new_with_json(self.quiet, self.verbose, json);
        match self.log_level {
            Some(level) => logger.with_level(level.into()),
            None => logger,
        }
    }

    /// Validated client settings from the merged options.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let defaults = ClientConfig::default();
        let retry = RetryPolicy::with_params(
            self.max_retries.unwrap_or(defaults.retry.max_retries),
            self.backoff_base_ms.map(Duration::from_millis).unwrap_or(defaults.retry.base_delay),
            self.backoff_factor.unwrap_or(defaults.retry.factor),
            self.jitter_ms.map(Duration::from_millis).unwrap_or(defaults.retry.jitter),
        )?
        .with_retry_statuses(self.retry_statuses.clone());

        let timeouts = Timeouts {
            connect: self.connect_timeout_ms.map(Duration::from_millis).unwrap_or(defaults.timeouts.connect),
            read: self.read_timeout_ms.map(Duration::from_millis).unwrap_or(defaults.timeouts.read),
            write: self.write_timeout_ms.map(Duration::from_millis).unwrap_or(defaults.timeouts.write),
        };

        let netrc = if self.netrc {
            let home = std::env::var("HOME")
                .with_context(|| "reading HOME environment variable for netrc".to_string())?;
            Some(PathBuf::from(home).join(".netrc"))
        } else {
            None
        };

        let config = ClientConfig {
            timeouts,
            retry,
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            headers: self.headers.clone(),
            netrc,
            show_progress: !self.quiet,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Positional URLs followed by the entries of `--input`, each paired with
    /// its destination path.
    pub fn download_jobs(&self) -> Result<Vec<DownloadJob>> {
        let mut entries: Vec<(String, Option<String>)> =
            self.urls.iter().map(|url| (url.clone(), None)).collect();
        if let Some(input) = &self.input {
            entries.extend(load_urls_from_file(input)?);
        }

        if entries.is_empty() {
            return Err(FetchError::config("no URLs given; pass them as arguments or with --input".to_string()));
        }
        if self.output.is_some() && entries.len() > 1 {
            return Err(FetchError::config("--output can only be used with a single URL".to_string()));
        }

        let jobs = entries
            .into_iter()
            .map(|(url, dest)| {
                let name = self
                    .output
                    .clone()
                    .or(dest)
                    .unwrap_or_else(|| get_fallback_filename(&url));
                let mut destination = PathBuf::from(name);
                if let Some(dir) = &self.output_dir {
                    if destination.is_relative() {
                        destination = PathBuf::from(dir).join(destination);
                    }
                }
                DownloadJob::new(url, destination)
            })
            .collect();
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "resget",
            "https://example.com/a.bin",
            "--resume",
            "--max-retries",
            "5",
            "--retry-status",
            "429",
            "-H",
            "Accept: */*",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.urls, vec!["https://example.com/a.bin"]);
        assert!(args.resume);
        assert_eq!(args.max_retries, Some(5));
        assert_eq!(args.retry_statuses, vec![429]);
        assert_eq!(args.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_client_config_defaults() {
        let args = Args::parse_from(["resget", "https://example.com"]);
        let config = args.client_config().unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.netrc.is_none());
    }

    #[test]
    fn test_download_jobs_destinations() {
        let args = Args::parse_from([
            "resget",
            "https://example.com/a/file.iso",
            "https://example.com/",
            "--output-dir",
            "out",
        ]);
        let jobs = args.download_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].destination, PathBuf::from("out/file.iso"));
        assert_eq!(jobs[1].destination, PathBuf::from("out/download.bin"));
        assert_eq!(jobs[0].request.url, "https://example.com/a/file.iso");
    }

    #[test]
    fn test_output_requires_single_url() {
        let args = Args::parse_from(["resget", "https://a/1", "https://a/2", "-o", "x.bin"]);
        assert!(args.download_jobs().is_err());

        let args = Args::parse_from(["resget", "https://a/1", "-o", "x.bin"]);
        assert_eq!(args.download_jobs().unwrap()[0].destination, PathBuf::from("x.bin"));
    }

    #[test]
    fn test_no_urls_is_error() {
        let args = Args::parse_from(["resget"]);
        assert!(args.download_jobs().is_err());
    }

    #[test]
    fn test_client_config_rejects_bad_factor() {
        let args = Args::parse_from(["resget", "u", "--backoff-factor", "0.5"]);
        assert!(args.client_config().is_err());
    }
}
