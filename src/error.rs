// Error taxonomy for a backup run. Every variant is terminal for the run;
// the stage it belongs to decides the process exit code.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The three sequential, independently fallible phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Archive,
    Upload,
}

impl Stage {
    /// Process exit code reported when a run fails in this stage.
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Scan => 3,
            Stage::Archive => 4,
            Stage::Upload => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scan => "scan",
            Stage::Archive => "archive",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("cannot read source directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no regular files found under {0}, nothing to archive")]
    EmptySource(PathBuf),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` {status}")]
    Archive { program: String, status: String },

    #[error("could not open file {path} for reading: {source}")]
    ArtifactOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // `detail` is curl's own description; it never carries credentials.
    #[error("FTP upload failed: {detail}")]
    Upload { detail: String },
}

impl BackupError {
    pub fn stage(&self) -> Stage {
        match self {
            BackupError::Scan { .. } | BackupError::EmptySource(_) => Stage::Scan,
            BackupError::Spawn { .. } | BackupError::Archive { .. } => Stage::Archive,
            BackupError::ArtifactOpen { .. } | BackupError::Upload { .. } => Stage::Upload,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.stage().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
