use std::fs;
use std::path::Path;
use crate::config::Config;
use crate::error::{ErrorCode, FetchError, Result};
use crate::output::Logger;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# ~/.resgetrc
# Every key is optional; command line flags take precedence.

# Headers sent with every request
headers = [
  "Accept: */*"
]

# Read Basic credentials from ~/.netrc
netrc = false

[retry]
max = 3           # Retries after the first attempt (0 disables retrying)
base_ms = 1000    # Delay before the first retry
factor = 2.0      # Multiplier applied to each following delay
jitter_ms = 0     # Upper bound of the random delay added to each wait
statuses = []     # Extra statuses to retry besides 5xx, e.g. [429]

[timeouts]
connect_ms = 5000
read_ms = 30000
write_ms = 10000

[download]
chunk_size = 8192
resume = true
jobs = 1
# output_dir = "/path/to/save"

[logging]
format = "text"   # Output format: "text" or "json"
level = "info"    # Log level: "debug", "info", "warn", "error"
quiet = false
verbose = false
"#;

/// Initialize a default configuration file at ~/.resgetrc
pub fn init_config(logger: &Logger) -> Result<()> {
    let path = Config::default_path()?;
    init_config_at(&path, logger)
}

/// Write the template to `path` unless a file is already there.
pub fn init_config_at(path: &Path, logger: &Logger) -> Result<()> {
    if fs::metadata(path).is_ok() {
        logger.warn(&format!("Configuration file already exists at {}", path.display()));
        return Ok(());
    }

    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(|e| {
        FetchError::file_system(
            ErrorCode::E104,
            format!("writing config file {}", path.display()),
            e,
        )
    })?;

    logger.info(&format!("Created configuration template at {}", path.display()));
    Ok(())
}
