pub mod cli;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod file_utils;
pub mod http;
pub mod init;
pub mod output;
pub mod progress;
pub mod retry;

// Re-export commonly used types for convenience
pub use cli::Args;
pub use client::{BatchOptions, Client, DownloadJob};
pub use config::{ClientConfig, Timeouts};
pub use download::DownloadState;
pub use error::{ErrorCode, ErrorKind, FetchError, Result};
pub use http::{Method, Request, Response, Session};
pub use progress::ProgressSink;
pub use retry::{Retryability, RetryPolicy};
