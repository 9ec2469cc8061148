use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use crate::error::{ErrorCode, ErrorKind, FetchError, Result, WithContext};

/// Load "URL [DESTINATION]" lines from an input file.
/// Filters out empty lines and comments (lines starting with #)
pub fn load_urls_from_file(path: &str) -> Result<Vec<(String, Option<String>)>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading input file '{}'", path))?;

    let entries = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut parts = line.split_whitespace();
            let url = parts.next().unwrap_or_default().to_string();
            let dest = parts.next().map(str::to_string);
            (url, dest)
        })
        .collect();

    Ok(entries)
}

/// Length of an existing partial file, `None` if there is none.
pub fn partial_len(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Err(FetchError::new(
            ErrorCode::E100,
            ErrorKind::Io,
            format!("{} exists and is not a regular file", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FetchError::file_system(
            ErrorCode::E100,
            format!("reading metadata for {}", path.display()),
            e,
        )),
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|e| {
            FetchError::file_system(
                ErrorCode::E103,
                format!("creating output directory {}", parent.display()),
                e,
            )
        }),
        _ => Ok(()),
    }
}

/// Open the destination for appending, or create/truncate it.
pub fn open_destination(path: &Path, append: bool) -> Result<File> {
    let result = if append {
        OpenOptions::new().append(true).create(true).open(path)
    } else {
        File::create(path)
    };
    result.map_err(|e| {
        let mode = if append { "append" } else { "write" };
        FetchError::file_system(
            ErrorCode::E104,
            format!("opening {} for {}", path.display(), mode),
            e,
        )
    })
}

/// Best-effort removal of a partial download.
pub fn remove_partial(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => e.kind() == io::ErrorKind::NotFound,
    }
}
