//! Download job: one `{url, destination}` unit of work.

use std::path::{Path, PathBuf};

/// One pending media fetch.
///
/// Construction normalizes the `.gifv` pseudo-format: the two renditions are
/// interchangeable and the `.mp4` version is always fetched instead, on both
/// the remote URL and the local destination. A job with a `.gifv` destination
/// therefore never exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    url: String,
    dest: PathBuf,
}

impl DownloadJob {
    /// Creates a job, rewriting `.gifv` to `.mp4` on both sides.
    #[must_use]
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        let mut url = url.into();
        let mut dest = dest.into();

        if url.ends_with(".gifv") {
            url.truncate(url.len() - ".gifv".len());
            url.push_str(".mp4");
        }
        if dest
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("gifv"))
        {
            dest.set_extension("mp4");
        }

        Self { url, dest }
    }

    /// The URL to fetch.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The local destination path.
    #[must_use]
    pub fn dest(&self) -> &Path {
        &self.dest
    }
}
