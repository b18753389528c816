// Directory inspection: counts regular files and their total size.

use crate::error::{BackupError, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Summary facts about a directory tree. Computed fresh on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySummary {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Walk `root` recursively and count regular files and their bytes.
///
/// Symlinks are not followed and, like devices and sockets, are not counted.
/// Subdirectories that cannot be read contribute nothing; only an unreadable
/// root is an error.
pub fn summarize(root: &Path) -> Result<DirectorySummary> {
    std::fs::read_dir(root).map_err(|source| BackupError::Scan {
        path: root.to_path_buf(),
        source,
    })?;

    let mut summary = DirectorySummary::default();
    let walker = WalkDir::new(root).min_depth(1).follow_links(false);
    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => {
                summary.file_count += 1;
                summary.total_bytes += meta.len();
            }
            Err(err) => tracing::debug!(path = %entry.path().display(), error = %err, "stat failed"),
        }
    }

    tracing::debug!(
        root = %root.display(),
        files = summary.file_count,
        bytes = summary.total_bytes,
        "directory summarized"
    );
    Ok(summary)
}
