//! Progress sinks for the streaming downloader.
//!
//! A sink sees the absolute position in the destination file (resume offset
//! included) and the total size when the server announced one.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub trait ProgressSink {
    /// Called once the response headers are known.
    fn start(&mut self, _offset: u64, _total: Option<u64>) {}

    /// Called after every non-empty chunk has been written.
    fn advance(&mut self, transferred: u64, total: Option<u64>);

    fn finish(&mut self) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(u64, Option<u64>),
{
    fn advance(&mut self, transferred: u64, total: Option<u64>) {
        self(transferred, total)
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&mut self, _transferred: u64, _total: Option<u64>) {}
}

/// Percentage complete, or `None` when the total is unknown or zero.
pub fn percent(transferred: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some(transferred as f64 * 100.0 / total as f64),
        _ => None,
    }
}

/// Terminal progress bar. Falls back to a spinner with a byte counter when
/// the size is unknown.
pub struct BarProgress {
    bar: ProgressBar,
    label: String,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        Self {
            bar: ProgressBar::no_length(),
            label: label.to_string(),
        }
    }

    /// Bar drawn as one line of a multi-file display.
    pub fn in_group(group: &MultiProgress, label: &str) -> Self {
        Self {
            bar: group.add(ProgressBar::no_length()),
            label: label.to_string(),
        }
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, offset: u64, total: Option<u64>) {
        match total {
            Some(total) => {
                self.bar.set_length(total);
                self.bar.set_style(
                    ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
            }
            None => {
                self.bar.set_style(
                    ProgressStyle::with_template("{msg} {spinner} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
            }
        }
        self.bar.set_message(self.label.clone());
        self.bar.set_position(offset);
    }

    fn advance(&mut self, transferred: u64, _total: Option<u64>) {
        self.bar.set_position(transferred);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
