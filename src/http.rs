use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use netrc::Netrc;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::LazyLock,
    time::Duration,
};
use crate::config::{ClientConfig, Timeouts};
use crate::error::{FetchError, Result, WithContext};
use crate::output::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Bytes(Vec<u8>),
}

/// Description of one HTTP call. Built up front, then only borrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.body = Some(Body::Json(serde_json::to_value(value)?));
        Ok(self)
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.body = Some(Body::Form(fields));
        self
    }

    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Some(Body::Bytes(body));
        self
    }

    /// "GET https://host/path", used in logs and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// A response whose body is read lazily, either whole or chunk by chunk.
pub struct Response {
    status: u16,
    headers: HeaderMap,
    url: String,
    body: Box<dyn Read + Send>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn new<R>(status: u16, headers: HeaderMap, url: impl Into<String>, body: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            status,
            headers,
            url: url.into(),
            body: Box::new(body),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    pub fn content_range(&self) -> Option<ContentRange> {
        self.headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
    }

    /// Turns a non-2xx status into `HttpStatus`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::http_status(&self.url, self.status))
        }
    }

    pub fn bytes(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .map_err(|e| FetchError::from_stream_read(&self.url, e))?;
        Ok(buf)
    }

    pub fn text(self) -> Result<String> {
        let url = self.url.clone();
        String::from_utf8(self.bytes()?)
            .map_err(|e| FetchError::parse(format!("body of {} is not UTF-8: {}", url, e)))
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let url = self.url.clone();
        let body = self.bytes()?;
        serde_json::from_slice(&body).with_context(|| format!("decoding JSON from {}", url))
    }
}

impl Read for Response {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.read(buf)
    }
}

/// Parsed `Content-Range` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First and last byte of the returned slice, `None` for `bytes */N`.
    pub range: Option<(u64, u64)>,
    /// Full resource size, `None` for `/*`.
    pub complete_length: Option<u64>,
}

static CONTENT_RANGE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^bytes\s+(?:(\d+)-(\d+)|\*)/(\d+|\*)$").ok());

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let cap = CONTENT_RANGE_RE.as_ref()?.captures(value.trim())?;
    let range = match (cap.get(1), cap.get(2)) {
        (Some(start), Some(end)) => Some((start.as_str().parse().ok()?, end.as_str().parse().ok()?)),
        _ => None,
    };
    let complete_length = match &cap[3] {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    if range.is_none() && complete_length.is_none() {
        return None;
    }
    Some(ContentRange { range, complete_length })
}

/// The connection object requests go through. Implementations own connection
/// reuse and authentication; they report transport failures but never judge
/// the status code.
pub trait Session {
    fn send(&self, request: &Request) -> Result<Response>;

    /// Like `send`, for responses whose body is consumed incrementally.
    fn open_stream(&self, request: &Request) -> Result<Response> {
        self.send(request)
    }
}

impl<S: Session + ?Sized> Session for &S {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }

    fn open_stream(&self, request: &Request) -> Result<Response> {
        (**self).open_stream(request)
    }
}

/// `Session` backed by a pooled `reqwest::blocking::Client`.
pub struct HttpSession {
    client: reqwest::blocking::Client,
    timeouts: Timeouts,
    download_timeout: Option<Duration>,
    credentials: Option<NetrcCredentials>,
}

impl HttpSession {
    pub fn new(config: &ClientConfig, logger: &Logger) -> Result<Self> {
        let mut default_headers = build_headers(&config.headers, logger);
        default_headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .timeout(config.timeouts.read)
            .cookie_store(true)
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .with_context(|| "building HTTP client".to_string())?;

        let credentials = match &config.netrc {
            Some(path) => NetrcCredentials::load(path)?,
            None => None,
        };

        Ok(Self {
            client,
            timeouts: config.timeouts,
            download_timeout: config.download_timeout,
            credentials,
        })
    }

    fn build(&self, request: &Request, deadline: Option<Duration>) -> Result<reqwest::blocking::RequestBuilder> {
        let url = reqwest::Url::parse(&request.url)
            .with_context(|| format!("parsing URL {}", request.url))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }
        if !request.has_header(AUTHORIZATION.as_str()) {
            if let Some(auth) = self.credentials.as_ref().and_then(|c| c.authorization_for(&url)) {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth)?);
            }
        }

        let mut builder = self
            .client
            .request(request.method.to_reqwest(), url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            Some(Body::Json(value)) => builder.json(value),
            Some(Body::Form(fields)) => builder.form(fields),
            Some(Body::Bytes(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }
        Ok(builder)
    }

    fn dispatch(&self, request: &Request, deadline: Option<Duration>) -> Result<Response> {
        let response = self
            .build(request, deadline)?
            .send()
            .map_err(|e| FetchError::from_reqwest(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        Ok(Response::new(status, headers, url, response))
    }
}

impl Session for HttpSession {
    fn send(&self, request: &Request) -> Result<Response> {
        self.dispatch(request, Some(self.timeouts.request_deadline()))
    }

    // The client's read timeout still bounds every body read.
    fn open_stream(&self, request: &Request) -> Result<Response> {
        self.dispatch(request, self.download_timeout)
    }
}

/// Build HTTP headers from "Name: value" strings, skipping malformed ones
pub fn build_headers(header_args: &[String], logger: &Logger) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for h in header_args {
        if let Some((k, v)) = h.split_once(':') {
            let name = match k.trim().parse::<HeaderName>() {
                Ok(name) => name,
                Err(_) => {
                    logger.warn(&format!("Invalid header name: {}", k.trim()));
                    continue;
                }
            };
            let value = match v.trim().parse::<HeaderValue>() {
                Ok(value) => value,
                Err(_) => {
                    logger.warn(&format!("Invalid header value: {}", v.trim()));
                    continue;
                }
            };
            headers.insert(name, value);
        } else {
            logger.warn(&format!("Ignoring header without ':' separator: {}", h));
        }
    }
    headers
}

/// Basic-auth credentials read from a netrc file.
#[derive(Debug, Clone)]
pub struct NetrcCredentials {
    hosts: Vec<(String, String, String)>,
}

impl NetrcCredentials {
    /// Returns `None` when the file does not exist or holds no usable entry.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path).with_context(|| format!("opening netrc file {}", path.display()))?;
        let Ok(netrc) = Netrc::parse(BufReader::new(file)) else {
            return Ok(None);
        };

        let hosts: Vec<_> = netrc
            .hosts
            .into_iter()
            .filter_map(|(host, machine)| {
                let password = machine.password.filter(|p| !p.is_empty())?;
                if machine.login.is_empty() {
                    return None;
                }
                Some((host, machine.login, password))
            })
            .collect();

        Ok((!hosts.is_empty()).then_some(Self { hosts }))
    }

    pub fn authorization_for(&self, url: &reqwest::Url) -> Option<String> {
        let host = url.host_str()?;
        let (_, login, password) = self.hosts.iter().find(|(h, _, _)| h == host)?;
        let encoded = BASE64_STANDARD.encode(format!("{}:{}", login, password));
        Some(format!("Basic {}", encoded))
    }
}

/// File name for a URL: its last non-empty path segment, or `download.bin`.
pub fn get_fallback_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_else(|| "download.bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_fallback_filename() {
        assert_eq!(get_fallback_filename("https://example.com/file.txt"), "file.txt");
        assert_eq!(get_fallback_filename("https://example.com/dir/archive.tar.gz?x=1"), "archive.tar.gz");
        assert_eq!(get_fallback_filename("https://example.com/"), "download.bin");
        assert_eq!(get_fallback_filename("https://example.com"), "download.bin");
        assert_eq!(get_fallback_filename("not a url"), "download.bin");
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 5-20/21"),
            Some(ContentRange { range: Some((5, 20)), complete_length: Some(21) })
        );
        assert_eq!(
            parse_content_range("bytes 0-99/*"),
            Some(ContentRange { range: Some((0, 99)), complete_length: None })
        );
        assert_eq!(
            parse_content_range("bytes */1234"),
            Some(ContentRange { range: None, complete_length: Some(1234) })
        );
        assert_eq!(parse_content_range("bytes */*"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    #[test]
    fn test_content_range_pattern_is_shared() {
        assert!(CONTENT_RANGE_RE.is_some());
        for _ in 0..3 {
            assert_eq!(
                parse_content_range(" bytes 10-19/20 ").and_then(|r| r.range),
                Some((10, 19))
            );
        }
    }

    #[test]
    fn test_build_headers_skips_invalid() {
        let logger = Logger::silent();
        let headers = build_headers(
            &[
                "Accept: */*".to_string(),
                "X-Api-Key: secret".to_string(),
                "bad header: x".to_string(),
                "no-separator".to_string(),
            ],
            &logger,
        );
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
    }

    #[test]
    fn test_request_builder() {
        let req = Request::get("https://example.com/users")
            .query("page", "2")
            .header("Accept", "application/json");
        assert_eq!(req.describe(), "GET https://example.com/users");
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert!(req.has_header("accept"));

        let req = Request::post("https://example.com/posts")
            .json(&serde_json::json!({"title": "hi", "userId": 1}))
            .unwrap();
        assert_eq!(req.body, Some(Body::Json(serde_json::json!({"title": "hi", "userId": 1}))));
    }

    #[test]
    fn test_response_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-10/11"));
        let resp = Response::new(206, headers, "https://example.com/f", Cursor::new(b"hello world".to_vec()));

        assert!(resp.is_success());
        assert_eq!(resp.content_length(), Some(11));
        assert_eq!(resp.content_range().unwrap().complete_length, Some(11));
        assert_eq!(resp.text().unwrap(), "hello world");
    }

    #[test]
    fn test_error_for_status() {
        let resp = Response::new(404, HeaderMap::new(), "https://example.com/x", Cursor::new(Vec::new()));
        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("https://example.com/x"));
    }

    #[test]
    fn test_response_json() {
        #[derive(serde::Deserialize)]
        struct User {
            name: String,
        }
        let resp = Response::new(200, HeaderMap::new(), "u", Cursor::new(br#"{"name":"Ada"}"#.to_vec()));
        let user: User = resp.json().unwrap();
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn test_netrc_credentials() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "machine files.example.com login alice password s3cret").unwrap();
        writeln!(file, "machine other.example.com login bob").unwrap();

        let creds = NetrcCredentials::load(file.path()).unwrap().unwrap();
        let url = reqwest::Url::parse("https://files.example.com/a.bin").unwrap();
        assert_eq!(
            creds.authorization_for(&url),
            Some(format!("Basic {}", BASE64_STANDARD.encode("alice:s3cret")))
        );
        let url = reqwest::Url::parse("https://other.example.com/a.bin").unwrap();
        assert_eq!(creds.authorization_for(&url), None);
    }

    #[test]
    fn test_missing_netrc_is_none() {
        let creds = NetrcCredentials::load(Path::new("/nonexistent/.netrc")).unwrap();
        assert!(creds.is_none());
    }
}
