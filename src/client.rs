use std::collections::HashSet;
use std::path::{Path, PathBuf};
use indicatif::MultiProgress;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::config::ClientConfig;
use crate::download::{DownloadState, Downloader};
use crate::error::{ErrorKind, FetchError, Result};
use crate::http::{HttpSession, Request, Response, Session};
use crate::output::Logger;
use crate::progress::{BarProgress, NoProgress, ProgressSink};
use crate::retry::Retryability;

/// One entry of a batch download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub request: Request,
    pub destination: PathBuf,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            request: Request::get(url),
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Downloads running at once. `0` and `1` both mean one after another.
    pub max_concurrent: usize,
    pub resume: bool,
    /// Wrap every item in the client's retry policy.
    pub retry: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            resume: false,
            retry: false,
        }
    }
}

/// HTTP client bundling a session, its settings and a logger.
///
/// All knobs are fixed at construction; every operation only borrows the
/// client, so one instance can serve concurrent downloads.
pub struct Client<S = HttpSession> {
    session: S,
    config: ClientConfig,
    logger: Logger,
}

impl Client<HttpSession> {
    pub fn new(config: ClientConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        let session = HttpSession::new(&config, &logger)?;
        Ok(Self { session, config, logger })
    }
}

impl<S: Session> Client<S> {
    /// Client over a caller-provided transport.
    pub fn with_session(session: S, config: ClientConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        Ok(Self { session, config, logger })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Performs exactly one call. Error statuses come back as `HttpStatus`.
    pub fn execute(&self, request: &Request) -> Result<Response> {
        self.logger.request(request.method.as_str(), &request.url);
        let response = self.session.send(request)?;
        self.logger.status(response.url(), response.status());
        self.logger.headers(response.headers());
        response.error_for_status()
    }

    /// `execute` under the client's retry policy.
    pub fn send(&self, request: &Request) -> Result<Response> {
        self.config
            .retry
            .run(&request.describe(), &self.logger, || self.execute(request))
    }

    pub fn get(&self, url: &str) -> Result<Response> {
        self.send(&Request::get(url))
    }

    /// Fetches and decodes a JSON body. Reading the body is part of the
    /// retried operation, so a reply cut short is retried too.
    pub fn get_json<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        self.config
            .retry
            .run(&request.describe(), &self.logger, || self.execute(request)?.json())
    }

    pub fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let request = Request::post(url).json(body)?;
        self.get_json(&request)
    }

    /// Streams `request` into `destination` once, without retrying.
    pub fn download(
        &self,
        request: &Request,
        destination: &Path,
        resume: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadState> {
        Downloader::new(&self.session, &self.logger, self.config.chunk_size)
            .fetch(request, destination, resume, progress)
    }

    /// Downloads under the retry policy.
    ///
    /// The first attempt honors `resume`. Bytes written before a retryable
    /// failure stay on disk and later attempts continue from them. Without
    /// `resume` the partial file is removed once no attempt is left.
    pub fn download_with_retry(
        &self,
        request: &Request,
        destination: &Path,
        resume: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadState> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts();
        let downloader = Downloader::new(&self.session, &self.logger, self.config.chunk_size);
        let mut attempt = 0;
        let mut partial_on_disk = false;

        policy.run(&request.describe(), &self.logger, || {
            attempt += 1;
            let more_attempts = attempt < max_attempts;
            let keep_partial = |cause: &FetchError| {
                resume || (more_attempts && policy.classify(cause) == Retryability::Retryable)
            };
            let result = downloader.fetch_with(
                request,
                destination,
                resume || partial_on_disk,
                &keep_partial,
                &mut *progress,
            );
            if let Err(FetchError { kind: ErrorKind::DownloadFailed { partial_kept }, .. }) = &result {
                partial_on_disk = *partial_kept;
            }
            result
        })
    }

    /// Progress display for one file, honoring `show_progress`.
    pub fn progress_for(&self, label: &str) -> Box<dyn ProgressSink> {
        if self.config.show_progress {
            Box::new(BarProgress::new(label))
        } else {
            Box::new(NoProgress)
        }
    }

    /// Downloads every job and returns the destinations that completed, in
    /// input order. A failed item is logged and handed to `on_failure`; it
    /// never stops the rest of the batch.
    pub fn download_many<F>(&self, jobs: &[DownloadJob], options: BatchOptions, mut on_failure: F) -> Vec<PathBuf>
    where
        S: Sync,
        F: FnMut(&DownloadJob, &FetchError),
    {
        let group = MultiProgress::new();
        let run_one = |job: &DownloadJob| -> Result<DownloadState> {
            let label = job.destination.display().to_string();
            let mut progress: Box<dyn ProgressSink> = if self.config.show_progress {
                Box::new(BarProgress::in_group(&group, &label))
            } else {
                Box::new(NoProgress)
            };
            if options.retry {
                self.download_with_retry(&job.request, &job.destination, options.resume, progress.as_mut())
            } else {
                self.download(&job.request, &job.destination, options.resume, progress.as_mut())
            }
        };

        let mut parallel = options.max_concurrent > 1 && jobs.len() > 1;
        if parallel && has_shared_destination(jobs) {
            self.logger.warn("Several jobs write to the same file, downloading sequentially");
            parallel = false;
        }

        let results: Vec<Result<DownloadState>> = if parallel {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_concurrent)
                .build()
            {
                Ok(pool) => pool.install(|| jobs.par_iter().map(run_one).collect()),
                Err(e) => {
                    self.logger.warn(&format!("Could not start worker pool, downloading sequentially: {}", e));
                    jobs.iter().map(run_one).collect()
                }
            }
        } else {
            jobs.iter().map(run_one).collect()
        };

        let mut completed = Vec::with_capacity(jobs.len());
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(state) => completed.push(state.destination),
                Err(err) => {
                    self.logger.error_from_fetch_error(&err);
                    on_failure(job, &err);
                }
            }
        }
        self.logger.summary(completed.len(), jobs.len());
        completed
    }
}

fn has_shared_destination(jobs: &[DownloadJob]) -> bool {
    let mut seen = HashSet::with_capacity(jobs.len());
    jobs.iter().any(|job| !seen.insert(&job.destination))
}
