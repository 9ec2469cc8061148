use clap::Parser;
use std::path::Path;
use std::process::exit;
use resget::config::Config;
use resget::output::Logger;
use resget::{init, Args, BatchOptions, Client, FetchError};

fn main() {
    let mut args = Args::parse();
    let startup_logger = args.logger();

    if args.init {
        if let Err(e) = init::init_config(&startup_logger) {
            fail(&startup_logger, &e);
        }
        return;
    }

    let config = match &args.config {
        Some(path) => Config::load_from_path(Path::new(path)),
        None => Config::load_from_file(),
    };
    if let Err(e) = config.and_then(|config| config.merge_with_args(&mut args)) {
        fail(&startup_logger, &e);
    }

    let logger = args.logger();
    let client = match args.client_config().and_then(|config| Client::new(config, logger.clone())) {
        Ok(client) => client,
        Err(e) => fail(&logger, &e),
    };
    let jobs = match args.download_jobs() {
        Ok(jobs) => jobs,
        Err(e) => fail(&logger, &e),
    };

    if let [job] = jobs.as_slice() {
        let mut progress = client.progress_for(&job.destination.display().to_string());
        if let Err(e) = client.download_with_retry(&job.request, &job.destination, args.resume, progress.as_mut()) {
            fail(&logger, &e);
        }
        return;
    }

    let options = BatchOptions {
        max_concurrent: args.jobs.unwrap_or(1),
        resume: args.resume,
        retry: true,
    };
    let completed = client.download_many(&jobs, options, |_, _| {});
    if completed.len() != jobs.len() {
        exit(1);
    }
}

fn fail(logger: &Logger, error: &FetchError) -> ! {
    logger.error_from_fetch_error(error);
    exit(1);
}
