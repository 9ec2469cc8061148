use std::collections::BTreeMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::error::{FetchError, ErrorCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogRecord {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub code: Option<String>,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Structured logger shared read-only by the client and the CLI.
#[derive(Debug, Clone)]
pub struct Logger {
    pub quiet: bool,
    pub verbose: bool,
    pub json_output: bool,
    pub min_level: LogLevel,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Logger {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self::new_with_json(quiet, verbose, false)
    }

    pub fn new_with_json(quiet: bool, verbose: bool, json_output: bool) -> Self {
        let min_level = if verbose { LogLevel::Debug } else { LogLevel::Info };
        Self { quiet, verbose, json_output, min_level }
    }

    /// Logger that only reports errors; used by tests and library callers
    /// that do their own reporting.
    pub fn silent() -> Self {
        Self::new(true, false)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        if self.quiet {
            return level == LogLevel::Error;
        }
        level >= self.min_level
    }

    fn log_structured(&self, level: LogLevel, message: &str, context: BTreeMap<String, String>, code: Option<String>) {
        if !self.enabled(level) {
            return;
        }
        let record = StructuredLogRecord {
            ts: Utc::now(),
            level,
            code,
            message: message.to_string(),
            context,
        };

        if self.json_output {
            if let Ok(json) = serde_json::to_string(&record) {
                println!("{}", json);
            }
        } else {
            println!("{}", format_human_readable(&record));
        }
    }

    pub fn debug(&self, message: &str) {
        self.debug_with_context(message, BTreeMap::new());
    }

    pub fn debug_with_context(&self, message: &str, context: BTreeMap<String, String>) {
        self.log_structured(LogLevel::Debug, message, context, None);
    }

    pub fn info(&self, message: &str) {
        self.info_with_context(message, BTreeMap::new());
    }

    pub fn info_with_context(&self, message: &str, context: BTreeMap<String, String>) {
        self.log_structured(LogLevel::Info, message, context, None);
    }

    pub fn warn(&self, message: &str) {
        self.warn_with_context(message, BTreeMap::new());
    }

    pub fn warn_with_context(&self, message: &str, context: BTreeMap<String, String>) {
        self.log_structured(LogLevel::Warn, message, context, None);
    }

    pub fn error(&self, message: &str) {
        self.error_with_context(message, BTreeMap::new());
    }

    pub fn error_with_context(&self, message: &str, context: BTreeMap<String, String>) {
        self.log_structured(LogLevel::Error, message, context, None);
    }

    pub fn error_from_fetch_error(&self, error: &FetchError) {
        let mut context = BTreeMap::new();
        context.insert("error_kind".to_string(), format!("{:?}", error.kind));
        context.insert("detail".to_string(), error.message.clone());
        if let Some(source) = &error.source {
            context.insert("source".to_string(), source.to_string());
        }

        let enhanced_message = format!("{} Hint: {}", error.code.message(), error.code.hint());
        self.log_structured(LogLevel::Error, &enhanced_message, context, Some(error.code.to_string()));
    }

    pub fn error_with_hint(&self, code: ErrorCode, message: &str) {
        let mut context = BTreeMap::new();
        context.insert("hint".to_string(), code.hint().to_string());

        let enhanced_message = format!("{} Hint: {}", message, code.hint());
        self.log_structured(LogLevel::Error, &enhanced_message, context, Some(code.to_string()));
    }

    pub fn request(&self, method: &str, url: &str) {
        let context = ctx(&[("method", method), ("url", url)]);
        self.debug_with_context("Sending request", context);
    }

    pub fn status(&self, url: &str, status: u16) {
        let context = ctx(&[("url", url), ("status", &status.to_string())]);
        self.debug_with_context("HTTP Status", context);
    }

    pub fn headers(&self, headers: &reqwest::header::HeaderMap) {
        if !self.enabled(LogLevel::Debug) {
            return;
        }
        for (key, value) in headers {
            let context = ctx(&[
                ("header_name", key.as_str()),
                ("header_value", value.to_str().unwrap_or("[binary]")),
            ]);
            self.debug_with_context("HTTP Header", context);
        }
    }

    pub fn retry_attempt(&self, target: &str, attempt: u32, max_attempts: u32, delay: Duration, error: &FetchError) {
        let context = ctx(&[
            ("target", target),
            ("attempt", &format!("{}/{}", attempt, max_attempts)),
            ("delay_ms", &delay.as_millis().to_string()),
            ("error", &error.to_string()),
        ]);
        self.warn_with_context("Retrying after error", context);
    }

    pub fn retries_exhausted(&self, target: &str, attempts: u32) {
        let context = ctx(&[("target", target), ("attempts", &attempts.to_string())]);
        self.warn_with_context("Giving up after retries", context);
    }

    pub fn download_start(&self, url: &str, output_path: &str) {
        let context = ctx(&[("url", url), ("output_path", output_path)]);
        self.info_with_context("Download started", context);
    }

    pub fn download_resume(&self, output_path: &str, bytes: u64) {
        let context = ctx(&[("output_path", output_path), ("resume_bytes", &bytes.to_string())]);
        self.info_with_context("Download resumed", context);
    }

    pub fn resume_unsupported(&self, output_path: &str) {
        let context = ctx(&[("output_path", output_path)]);
        self.warn_with_context("Server ignored range request, restarting from byte 0", context);
    }

    pub fn download_complete(&self, output_path: &str, bytes: u64) {
        let context = ctx(&[("output_path", output_path), ("bytes", &bytes.to_string())]);
        self.info_with_context("Download complete", context);
    }

    pub fn summary(&self, successful: usize, total: usize) {
        let context = ctx(&[("successful", &successful.to_string()), ("total", &total.to_string())]);
        self.info_with_context("Download summary", context);
    }
}

fn ctx(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn format_human_readable(record: &StructuredLogRecord) -> String {
    let timestamp = record.ts.format("%Y-%m-%dT%H:%M:%SZ");
    let code_str = record.code.as_deref().unwrap_or("");
    let context_str = if record.context.is_empty() {
        String::new()
    } else {
        format!(" | {}",
            record.context.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    if !code_str.is_empty() {
        format!("[{}][{}][{}] {}{}", code_str, record.level.as_str(), timestamp, record.message, context_str)
    } else {
        format!("[{}][{}] {}{}", record.level.as_str(), timestamp, record.message, context_str)
    }
}
