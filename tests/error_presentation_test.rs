use resget::error::{ErrorCode, ErrorKind, FetchError};
use resget::output::{format_human_readable, LogLevel, Logger, StructuredLogRecord};
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::process::Command;

#[test]
fn test_error_code_concise_messages() {
    assert_eq!(ErrorCode::E203.message(), "HTTP server error");
    assert_eq!(ErrorCode::E101.message(), "File not found");
    assert_eq!(ErrorCode::E300.message(), "Configuration error");
    assert_eq!(ErrorCode::E404.message(), "Request timeout");
    assert_eq!(ErrorCode::E505.message(), "Retries exhausted");
}

#[test]
fn test_error_code_hints() {
    assert_eq!(ErrorCode::E203.hint(), "Server is experiencing issues, try again later");
    assert_eq!(ErrorCode::E102.hint(), "Run with appropriate permissions or check file ownership");
    assert_eq!(ErrorCode::E506.hint(), "Re-run with --resume to continue from the partial file");
}

#[test]
fn test_error_display_format() {
    assert_eq!(format!("{}", ErrorCode::E203), "E203");
    assert_eq!(format!("{}", ErrorCode::E100), "E100");
    assert_eq!(format!("{}", ErrorCode::E505), "E505");

    let error = FetchError::http_status("https://example.com/x", 500);
    let shown = error.to_string();
    assert!(shown.starts_with("E203"));
    assert!(shown.contains("https://example.com/x"));
}

#[test]
fn test_all_error_codes_have_messages_and_hints() {
    let error_codes = [
        ErrorCode::E100, ErrorCode::E101, ErrorCode::E102, ErrorCode::E103, ErrorCode::E104,
        ErrorCode::E200, ErrorCode::E202, ErrorCode::E203, ErrorCode::E204, ErrorCode::E205,
        ErrorCode::E300, ErrorCode::E302, ErrorCode::E304,
        ErrorCode::E400, ErrorCode::E403, ErrorCode::E404,
        ErrorCode::E500, ErrorCode::E501, ErrorCode::E505, ErrorCode::E506,
    ];

    for code in &error_codes {
        assert!(!code.message().is_empty(), "Error code {:?} has empty message", code);
        assert!(!code.hint().is_empty(), "Error code {:?} has empty hint", code);
        assert_ne!(code.message(), code.hint(), "Error code {:?} has same message and hint", code);
    }
}

#[test]
fn test_human_readable_record() {
    let mut context = BTreeMap::new();
    context.insert("attempt".to_string(), "2".to_string());
    let record = StructuredLogRecord {
        ts: chrono::Utc::now(),
        level: LogLevel::Warn,
        code: Some("E403".to_string()),
        message: "Retrying".to_string(),
        context,
    };

    let line = format_human_readable(&record);
    assert!(line.starts_with("[E403][WARN]["));
    assert!(line.ends_with("Retrying | attempt=2"));
}

#[test]
fn test_logger_levels() {
    let quiet = Logger::new(true, true);
    assert!(quiet.enabled(LogLevel::Error));
    assert!(!quiet.enabled(LogLevel::Warn));

    let verbose = Logger::new(false, true);
    assert!(verbose.enabled(LogLevel::Debug));

    let warn_only = Logger::new(false, false).with_level(LogLevel::Warn);
    assert!(!warn_only.enabled(LogLevel::Info));
    assert!(warn_only.enabled(LogLevel::Warn));
}

#[test]
fn test_structured_log_emission() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("empty.toml");
    std::fs::write(&config, "").unwrap();
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_resget"))
        .env("HOME", dir.path())
        .args([
            "--config",
            config.to_str().unwrap(),
            "--log-format",
            "json",
            "--max-retries",
            "0",
            "--output",
            dir.path().join("out.bin").to_str().unwrap(),
            format!("http://{}/file", addr).as_str(),
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let errors: Vec<StructuredLogRecord> = stdout
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .filter(|record: &StructuredLogRecord| record.level == LogLevel::Error)
        .collect();

    assert_eq!(errors.len(), 1, "stdout was: {}", stdout);
    assert_eq!(errors[0].code.as_deref(), Some("E403"));
    assert_eq!(errors[0].context.get("error_kind").map(String::as_str), Some("Connection"));
}

#[test]
fn test_error_conversion_preserves_code() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error = FetchError::from(io_error);
    assert_eq!(error.code, ErrorCode::E102);
    assert_eq!(error.kind, ErrorKind::Io);

    let url_error = url::Url::parse("not a url").unwrap_err();
    assert_eq!(FetchError::from(url_error).code, ErrorCode::E204);
}
