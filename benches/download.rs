use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use resget::config::ClientConfig;
use resget::output::Logger;
use resget::progress::NoProgress;
use resget::{Client, Request, Response, Session};
use std::io::Cursor;
use tempfile::tempdir;

const PAYLOAD_LEN: usize = 4 * 1024 * 1024;

/// Serves the same in-memory body for every request.
struct MemorySession {
    body: Vec<u8>,
}

impl Session for MemorySession {
    fn send(&self, request: &Request) -> resget::Result<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len() as u64));
        Ok(Response::new(200, headers, request.url.clone(), Cursor::new(self.body.clone())))
    }
}

fn bench_download(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("bench.bin");
    let request = Request::get("http://bench.local/blob");

    let mut group = c.benchmark_group("stream_to_file");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    for chunk_size in [1024usize, 8192, 65536] {
        let session = MemorySession { body: vec![0xAB; PAYLOAD_LEN] };
        let config = ClientConfig::default().with_chunk_size(chunk_size);
        let client = Client::with_session(session, config, Logger::silent()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, _| {
            b.iter(|| {
                client.download(&request, &dest, false, &mut NoProgress).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_download);
criterion_main!(benches);
