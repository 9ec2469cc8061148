use std::fmt;
use std::io;

#[derive(Debug)]
pub struct FetchError {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// What went wrong, in the terms the retry controller classifies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure before (or while) a response was obtained.
    Connection,
    /// A connect, read or write deadline elapsed.
    Timeout,
    /// Well-formed response carrying an error status.
    HttpStatus(u16),
    /// Retryable failures kept happening until the attempt budget ran out.
    RetryExhausted { attempts: u32 },
    /// A file transfer broke mid-stream.
    DownloadFailed { partial_kept: bool },
    Io,
    Config,
    Parse,
    /// Request could not be built or the server answered something unusable.
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // E1xx: I/O errors
    E100 = 100, // General I/O error
    E101 = 101, // File not found
    E102 = 102, // Permission denied
    E103 = 103, // Directory creation failed
    E104 = 104, // File write error

    // E2xx: HTTP errors
    E200 = 200, // General HTTP error
    E202 = 202, // HTTP client error (4xx)
    E203 = 203, // HTTP server error (5xx)
    E204 = 204, // Invalid URL
    E205 = 205, // Unusable partial content response

    // E3xx: Configuration errors
    E300 = 300, // General config error
    E302 = 302, // Invalid config format
    E304 = 304, // Invalid config value

    // E4xx: Network errors
    E400 = 400, // General network error
    E403 = 403, // Connection failed
    E404 = 404, // Request timeout

    // E5xx: Internal errors
    E500 = 500, // General internal error
    E501 = 501, // Parse error
    E505 = 505, // Retries exhausted
    E506 = 506, // Download failed
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:03}", *self as u16)
    }
}

impl ErrorCode {
    /// Returns a concise human-readable message for the error code
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::E100 => "General I/O error",
            ErrorCode::E101 => "File not found",
            ErrorCode::E102 => "Permission denied",
            ErrorCode::E103 => "Directory creation failed",
            ErrorCode::E104 => "File write error",

            ErrorCode::E200 => "HTTP request failed",
            ErrorCode::E202 => "HTTP client error",
            ErrorCode::E203 => "HTTP server error",
            ErrorCode::E204 => "Invalid URL",
            ErrorCode::E205 => "Invalid partial content response",

            ErrorCode::E300 => "Configuration error",
            ErrorCode::E302 => "Invalid config format",
            ErrorCode::E304 => "Invalid config value",

            ErrorCode::E400 => "Network error",
            ErrorCode::E403 => "Connection failed",
            ErrorCode::E404 => "Request timeout",

            ErrorCode::E500 => "Internal error",
            ErrorCode::E501 => "Parse error",
            ErrorCode::E505 => "Retries exhausted",
            ErrorCode::E506 => "Download failed",
        }
    }

    /// Returns a troubleshooting hint for the error code
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCode::E100 => "Check file permissions and disk space",
            ErrorCode::E101 => "Verify the file path exists",
            ErrorCode::E102 => "Run with appropriate permissions or check file ownership",
            ErrorCode::E103 => "Check parent directory permissions and disk space",
            ErrorCode::E104 => "Ensure sufficient disk space and write permissions",

            ErrorCode::E200 => "Check URL validity and server status",
            ErrorCode::E202 => "Verify URL and request parameters",
            ErrorCode::E203 => "Server is experiencing issues, try again later",
            ErrorCode::E204 => "Check URL format and protocol",
            ErrorCode::E205 => "Delete the partial file and download again without --resume",

            ErrorCode::E300 => "Check configuration file syntax",
            ErrorCode::E302 => "Validate TOML syntax in config file",
            ErrorCode::E304 => "Check config value format and constraints",

            ErrorCode::E400 => "Check internet connection and network settings",
            ErrorCode::E403 => "Check if the host is reachable and the service is running",
            ErrorCode::E404 => "Check internet connection or raise the timeouts",

            ErrorCode::E500 => "Report this issue with debug information",
            ErrorCode::E501 => "Check input format and syntax",
            ErrorCode::E505 => "Server kept failing, try again later or use --max-retries",
            ErrorCode::E506 => "Re-run with --resume to continue from the partial file",
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|boxed| &**boxed as &(dyn std::error::Error + 'static))
    }
}

impl FetchError {
    pub fn new(code: ErrorCode, kind: ErrorKind, message: String) -> Self {
        FetchError {
            code,
            kind,
            message,
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        kind: ErrorKind,
        message: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        FetchError {
            code,
            kind,
            message,
            source: Some(source),
        }
    }

    pub fn connection(target: &str, detail: &str) -> Self {
        Self::new(
            ErrorCode::E403,
            ErrorKind::Connection,
            format!("connection to {} failed: {}", target, detail),
        )
    }

    pub fn timeout(target: &str, detail: &str) -> Self {
        Self::new(
            ErrorCode::E404,
            ErrorKind::Timeout,
            format!("request to {} timed out: {}", target, detail),
        )
    }

    pub fn http_status(target: &str, status: u16) -> Self {
        let code = if (500..600).contains(&status) {
            ErrorCode::E203
        } else {
            ErrorCode::E202
        };
        Self::new(
            code,
            ErrorKind::HttpStatus(status),
            format!("{} returned HTTP {}", target, status),
        )
    }

    /// Wraps the last retryable failure once the attempt budget is spent.
    pub fn retry_exhausted(target: &str, attempts: u32, last: FetchError) -> Self {
        let message = format!(
            "{} still failing after {} attempts, last error: {}",
            target, attempts, last
        );
        Self::with_source(
            ErrorCode::E505,
            ErrorKind::RetryExhausted { attempts },
            message,
            Box::new(last),
        )
    }

    pub fn download_failed(destination: &str, partial_kept: bool, cause: FetchError) -> Self {
        let kept = if partial_kept {
            "partial file kept for resume"
        } else {
            "partial file removed"
        };
        let message = format!("download to {} failed ({}): {}", destination, kept, cause);
        Self::with_source(
            ErrorCode::E506,
            ErrorKind::DownloadFailed { partial_kept },
            message,
            Box::new(cause),
        )
    }

    pub fn config(msg: String) -> Self {
        Self::new(ErrorCode::E304, ErrorKind::Config, format!("Configuration error: {}", msg))
    }

    pub fn parse(msg: String) -> Self {
        Self::new(ErrorCode::E501, ErrorKind::Parse, format!("Parse error: {}", msg))
    }

    pub fn request(msg: String) -> Self {
        Self::new(ErrorCode::E200, ErrorKind::Request, msg)
    }

    pub fn file_system(code: ErrorCode, msg: String, err: io::Error) -> Self {
        Self::with_source(code, ErrorKind::Io, msg, Box::new(err))
    }

    /// Maps a reqwest failure onto the executor's error kinds.
    pub fn from_reqwest(target: &str, err: reqwest::Error) -> Self {
        let detail = err.to_string();
        let mut error = if err.is_timeout() {
            Self::timeout(target, &detail)
        } else if let Some(status) = err.status() {
            Self::http_status(target, status.as_u16())
        } else if err.is_connect() || err.is_body() || looks_like_transport_failure(&err) {
            Self::connection(target, &detail)
        } else if err.is_builder() {
            Self::new(
                ErrorCode::E204,
                ErrorKind::Request,
                format!("invalid request for {}: {}", target, detail),
            )
        } else {
            Self::request(format!("request to {} failed: {}", target, detail))
        };
        error.source = Some(Box::new(err));
        error
    }

    /// Classifies a failed read from a response body. Everything except an
    /// elapsed deadline counts as a broken transport.
    pub fn from_stream_read(target: &str, err: io::Error) -> Self {
        let timed_out = matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
            || err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
                .is_some_and(|inner| inner.is_timeout());
        let detail = err.to_string();
        let mut error = if timed_out {
            Self::timeout(target, &detail)
        } else {
            Self::connection(target, &detail)
        };
        error.source = Some(Box::new(err));
        error
    }

    /// Add context to an existing error
    pub fn with_context(self, context: &str) -> Self {
        FetchError {
            code: self.code,
            kind: self.kind,
            message: format!("{}: {}", context, self.message),
            source: self.source,
        }
    }

    /// HTTP status carried by this error, if it is a status error.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::HttpStatus(status) => Some(status),
            _ => None,
        }
    }

    /// The wrapped error of a `RetryExhausted` or `DownloadFailed`.
    pub fn cause(&self) -> Option<&FetchError> {
        self.source.as_ref()?.downcast_ref::<FetchError>()
    }

    /// Follows `cause` links down to the innermost `FetchError`.
    pub fn root_cause(&self) -> &FetchError {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }
}

fn looks_like_transport_failure(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        let text = inner.to_string().to_lowercase();
        if text.contains("connection reset")
            || text.contains("broken pipe")
            || text.contains("connection aborted")
            || text.contains("network unreachable")
            || text.contains("host unreachable")
        {
            return true;
        }
        source = inner.source();
    }
    false
}

impl From<io::Error> for FetchError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::E101,
            io::ErrorKind::PermissionDenied => ErrorCode::E102,
            _ => ErrorCode::E100,
        };
        FetchError {
            code,
            kind: ErrorKind::Io,
            message: format!("I/O error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let target = err
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown url>".to_string());
        Self::from_reqwest(&target, err)
    }
}

impl From<toml::de::Error> for FetchError {
    fn from(err: toml::de::Error) -> Self {
        FetchError {
            code: ErrorCode::E302,
            kind: ErrorKind::Config,
            message: format!("Configuration error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::header::InvalidHeaderValue> for FetchError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        FetchError {
            code: ErrorCode::E501,
            kind: ErrorKind::Parse,
            message: format!("Invalid header value: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::header::InvalidHeaderName> for FetchError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        FetchError {
            code: ErrorCode::E501,
            kind: ErrorKind::Parse,
            message: format!("Invalid header name: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError {
            code: ErrorCode::E204,
            kind: ErrorKind::Parse,
            message: format!("URL parse error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError {
            code: ErrorCode::E501,
            kind: ErrorKind::Parse,
            message: format!("JSON error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::env::VarError> for FetchError {
    fn from(err: std::env::VarError) -> Self {
        FetchError {
            code: ErrorCode::E300,
            kind: ErrorKind::Config,
            message: format!("Configuration error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<String> for FetchError {
    fn from(msg: String) -> Self {
        Self::new(ErrorCode::E500, ErrorKind::Request, msg)
    }
}

impl From<&str> for FetchError {
    fn from(msg: &str) -> Self {
        Self::new(ErrorCode::E500, ErrorKind::Request, msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Trait for adding context to errors
pub trait WithContext<T> {
    /// Add context to the error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> WithContext<T> for std::result::Result<T, E>
where
    E: Into<FetchError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(&f()))
    }
}
