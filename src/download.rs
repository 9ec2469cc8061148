//! Streaming download of one resource into one file.
//!
//! The body is copied in bounded chunks in the order received. With resume
//! enabled an existing partial file is continued through a `Range` request;
//! servers that ignore the range get the file rewritten from byte 0.

use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use reqwest::header::RANGE;
use crate::error::{ErrorCode, ErrorKind, FetchError, Result};
use crate::file_utils::{ensure_parent_dir, open_destination, partial_len, remove_partial};
use crate::http::{ContentRange, Request, Response, Session};
use crate::output::Logger;
use crate::progress::{self, ProgressSink};

const PARTIAL_CONTENT: u16 = 206;
const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Bookkeeping for one download, returned once it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadState {
    pub destination: PathBuf,
    pub chunk_size: usize,
    /// Bytes received during this call.
    pub transferred: u64,
    /// Full resource size, if the server announced it.
    pub total: Option<u64>,
    /// Bytes that were already on disk and kept.
    pub resume_offset: u64,
}

impl DownloadState {
    /// Current length of the destination file.
    pub fn position(&self) -> u64 {
        self.resume_offset + self.transferred
    }

    pub fn percent(&self) -> Option<f64> {
        progress::percent(self.position(), self.total)
    }
}

pub struct Downloader<'a, S: Session> {
    session: &'a S,
    logger: &'a Logger,
    chunk_size: usize,
}

impl<'a, S: Session> Downloader<'a, S> {
    pub fn new(session: &'a S, logger: &'a Logger, chunk_size: usize) -> Self {
        Self {
            session,
            logger,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Download `request` into `destination`.
    ///
    /// Failures before the destination is touched (connection errors, error
    /// statuses) are returned unchanged. Failures while streaming come back as
    /// `DownloadFailed`; the partial file is removed unless `resume` is set.
    pub fn fetch(
        &self,
        request: &Request,
        destination: &Path,
        resume: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadState> {
        self.fetch_with(request, destination, resume, &|_| resume, progress)
    }

    /// Like `fetch`, but `keep_partial` decides from the mid-stream failure
    /// whether the bytes written so far stay on disk.
    pub fn fetch_with(
        &self,
        request: &Request,
        destination: &Path,
        resume: bool,
        keep_partial: &dyn Fn(&FetchError) -> bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadState> {
        let dest_display = destination.display().to_string();
        ensure_parent_dir(destination)?;

        let offset = if resume {
            partial_len(destination)?.unwrap_or(0)
        } else {
            0
        };

        let mut request = request.clone();
        if offset > 0 {
            request = request.header(RANGE.as_str(), &format!("bytes={}-", offset));
            self.logger.download_resume(&dest_display, offset);
        }

        self.logger.download_start(&request.url, &dest_display);
        self.logger.request(request.method.as_str(), &request.url);
        let response = self.session.open_stream(&request)?;
        self.logger.status(response.url(), response.status());
        self.logger.headers(response.headers());

        if offset > 0 && response.status() == RANGE_NOT_SATISFIABLE {
            let complete = response.content_range().and_then(|r| r.complete_length);
            if complete == Some(offset) {
                self.logger.info(&format!("{} already fully downloaded", dest_display));
                progress.start(offset, complete);
                progress.finish();
                return Ok(DownloadState {
                    destination: destination.to_path_buf(),
                    chunk_size: self.chunk_size,
                    transferred: 0,
                    total: complete,
                    resume_offset: offset,
                });
            }
        }
        let response = response.error_for_status()?;

        let (append, offset, total) = if response.status() == PARTIAL_CONTENT {
            let range = response.content_range();
            check_range_start(&request.url, range, offset)?;
            let total = range
                .and_then(|r| r.complete_length)
                .or_else(|| response.content_length().map(|len| len + offset));
            (offset > 0, offset, total)
        } else {
            if offset > 0 {
                self.logger.resume_unsupported(&dest_display);
            }
            (false, 0, response.content_length())
        };

        let mut file = open_destination(destination, append)?;
        let mut state = DownloadState {
            destination: destination.to_path_buf(),
            chunk_size: self.chunk_size,
            transferred: 0,
            total,
            resume_offset: offset,
        };

        progress.start(offset, total);
        let copied = self.copy_chunks(response, &mut file, &mut state, progress);
        drop(file);

        match copied {
            Ok(()) => {
                progress.finish();
                self.logger.download_complete(&dest_display, state.position());
                Ok(state)
            }
            Err(err) => {
                progress.finish();
                let partial_kept = keep_partial(&err) || !remove_partial(destination);
                Err(FetchError::download_failed(&dest_display, partial_kept, err))
            }
        }
    }

    fn copy_chunks(
        &self,
        mut response: Response,
        file: &mut File,
        state: &mut DownloadState,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let url = response.url().to_string();
        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let n = match response.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::from_stream_read(&url, e)),
            };
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).map_err(|e| {
                FetchError::file_system(
                    ErrorCode::E104,
                    format!("writing to {}", state.destination.display()),
                    e,
                )
            })?;
            state.transferred += n as u64;
            progress.advance(state.position(), state.total);
        }

        file.flush().map_err(|e| {
            FetchError::file_system(
                ErrorCode::E104,
                format!("flushing {}", state.destination.display()),
                e,
            )
        })?;

        if let Some(total) = state.total {
            if state.position() < total {
                return Err(FetchError::connection(
                    &url,
                    &format!("stream ended after {} of {} bytes", state.position(), total),
                ));
            }
        }
        Ok(())
    }
}

fn check_range_start(url: &str, range: Option<ContentRange>, offset: u64) -> Result<()> {
    match range.and_then(|r| r.range) {
        Some((start, _)) if start != offset => Err(FetchError::new(
            ErrorCode::E205,
            ErrorKind::Request,
            format!("{} answered range starting at byte {}, expected {}", url, start, offset),
        )),
        _ => Ok(()),
    }
}
