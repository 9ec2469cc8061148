use resget::config::{ClientConfig, Timeouts};
use resget::error::{ErrorCode, ErrorKind, FetchError, Result};
use resget::output::Logger;
use resget::progress::NoProgress;
use resget::retry::RetryPolicy;
use resget::{Client, Request};
use std::net::TcpListener;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(max_retries: u32) -> ClientConfig {
    let retry = RetryPolicy::with_params(max_retries, Duration::from_millis(5), 2.0, Duration::ZERO).unwrap();
    ClientConfig::default().with_retry(retry)
}

/// The blocking client must not be built or dropped on a runtime thread.
async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test]
async fn test_fail_twice_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .mount(&server)
        .await;

    let url = format!("{}/flaky", server.uri());
    let body = blocking(move || -> Result<String> {
        let client = Client::new(config(3), Logger::silent())?;
        client.get(&url)?.text()
    })
    .await
    .unwrap();

    assert_eq!(body, "finally");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_download_retries_after_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    let url = format!("{}/file.bin", server.uri());
    let target = dest.clone();
    let state = blocking(move || -> Result<resget::DownloadState> {
        let client = Client::new(config(2), Logger::silent())?;
        client.download_with_retry(&Request::get(url), &target, true, &mut NoProgress)
    })
    .await
    .unwrap();

    assert_eq!(state.position(), 4096);
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let url = format!("{}/slow", server.uri());
    let err = blocking(move || -> Result<()> {
        let timeouts = Timeouts {
            connect: Duration::from_millis(500),
            read: Duration::from_millis(100),
            write: Duration::from_millis(100),
        };
        let client = Client::new(config(0).with_timeouts(timeouts), Logger::silent())?;
        client.get(&url).map(|_| ())
    })
    .await
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.code, ErrorCode::E404);
}

#[tokio::test]
async fn test_stalled_download_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stall.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 1024])
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("stall.bin");
    let url = format!("{}/stall.bin", server.uri());
    let target = dest.clone();
    let err = blocking(move || -> Result<resget::DownloadState> {
        let timeouts = Timeouts {
            connect: Duration::from_millis(500),
            read: Duration::from_millis(200),
            write: Duration::from_millis(200),
        };
        let client = Client::new(config(0).with_timeouts(timeouts), Logger::silent())?;
        client.download(&Request::get(url), &target, false, &mut NoProgress)
    })
    .await
    .unwrap_err();

    assert_eq!(err.root_cause().kind, ErrorKind::Timeout);
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_refused_connection_is_exhausted_connection_error() {
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let url = format!("http://{}/nothing", addr);

    let err = blocking(move || -> Result<()> {
        let client = Client::new(config(1), Logger::silent())?;
        client.get(&url).map(|_| ())
    })
    .await
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RetryExhausted { attempts: 2 });
    assert_eq!(err.root_cause().kind, ErrorKind::Connection);
}

#[test]
fn test_error_code_matching_in_results() {
    let result = std::fs::read_to_string("/nonexistent/file/path");
    let err = FetchError::from(result.unwrap_err());
    assert_eq!(err.code, ErrorCode::E101);
    assert_eq!(err.kind, ErrorKind::Io);

    let toml_error = toml::from_str::<std::collections::HashMap<String, String>>("invalid toml [").unwrap_err();
    let err = FetchError::from(toml_error);
    assert_eq!(err.code, ErrorCode::E302);
    assert_eq!(err.kind, ErrorKind::Config);
}

#[test]
fn test_error_pattern_matching() {
    fn simulate(status: u16) -> Result<String> {
        Err(FetchError::http_status("https://example.com/x", status))
    }

    match simulate(500) {
        Err(e) if e.code == ErrorCode::E203 => assert!(e.message.contains("HTTP 500")),
        other => panic!("unexpected result: {:?}", other),
    }
    match simulate(403) {
        Err(e) => assert_eq!((e.code, e.status()), (ErrorCode::E202, Some(403))),
        Ok(_) => panic!("expected error"),
    }
}

#[test]
fn test_download_failure_wraps_cause() {
    let cause = FetchError::connection("http://h/f", "connection reset by peer");
    let err = FetchError::download_failed("/tmp/f", true, cause);

    assert_eq!(err.code, ErrorCode::E506);
    assert_eq!(err.kind, ErrorKind::DownloadFailed { partial_kept: true });
    assert!(err.to_string().contains("partial file kept"));
    assert_eq!(err.root_cause().kind, ErrorKind::Connection);
}
