// Upload client: streams the artifact to an FTP server through libcurl.
// The file is read in chunks by curl's read callback and never held in
// memory as a whole.

use crate::error::{BackupError, Result};
use curl::easy::{Easy, ReadError};
use libc::c_long;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
#[cfg(any(test, feature = "test-util"))]
use std::path::PathBuf;
#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex};

/// Where and as whom to upload. Supplied by the caller as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

impl UploadTarget {
    /// `ftp://host:port/<artifact>`. Credentials are passed separately and
    /// never appear in the URL.
    pub fn remote_url(&self, artifact_name: &str) -> String {
        format!("ftp://{}:{}/{}", self.host, self.port, artifact_name)
    }
}

impl fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transfers a local file to a remote URL.
///
/// Implemented by [`FtpUploader`] for real transfers and, in tests or with
/// the `test-util` feature, by `MockUploader`.
pub trait Uploader {
    fn upload(&self, target: &UploadTarget, url: &str, local_file: &Path) -> Result<()>;
}

/// libcurl-backed FTP upload. One attempt, no retry, no resume.
#[derive(Debug, Default)]
pub struct FtpUploader;

impl FtpUploader {
    pub fn new() -> Self {
        Self
    }
}

/// `CURLFTP_CREATE_DIR_RETRY`: create missing remote directories, and retry
/// CWD once if a concurrent client created one first.
const CREATE_DIR_RETRY: c_long = 2;

/// Ask libcurl to create any missing directories in the remote path.
///
/// `Easy` has no safe wrapper for this option.
fn create_missing_dirs(easy: &mut Easy) -> std::result::Result<(), curl::Error> {
    // SAFETY: `easy.raw()` is a live handle owned by `easy`, and this option
    // takes a single `long` argument.
    let code = unsafe {
        curl_sys::curl_easy_setopt(
            easy.raw(),
            curl_sys::CURLOPT_FTP_CREATE_MISSING_DIRS,
            CREATE_DIR_RETRY,
        )
    };
    if code == curl_sys::CURLE_OK {
        Ok(())
    } else {
        Err(curl::Error::new(code))
    }
}

/// Set every transfer option except the data callbacks.
fn configure(
    easy: &mut Easy,
    target: &UploadTarget,
    url: &str,
    size: Option<u64>,
) -> std::result::Result<(), curl::Error> {
    easy.url(url)?;
    easy.username(&target.username)?;
    easy.password(&target.password)?;
    easy.upload(true)?;
    create_missing_dirs(easy)?;
    if let Some(size) = size {
        easy.in_filesize(size)?;
    }
    Ok(())
}

fn transfer_error(err: curl::Error) -> BackupError {
    BackupError::Upload {
        detail: err.to_string(),
    }
}

impl Uploader for FtpUploader {
    fn upload(&self, target: &UploadTarget, url: &str, local_file: &Path) -> Result<()> {
        let mut file = File::open(local_file).map_err(|source| BackupError::ArtifactOpen {
            path: local_file.to_path_buf(),
            source,
        })?;
        let size = file.metadata().map(|m| m.len()).ok();

        let mut easy = Easy::new();
        configure(&mut easy, target, url, size).map_err(transfer_error)?;

        tracing::info!(%url, user = %target.username, "starting FTP upload");
        let mut transfer = easy.transfer();
        transfer
            .read_function(|buf| {
                file.read(buf).map_err(|err| {
                    tracing::error!(error = %err, "reading artifact failed mid-upload");
                    ReadError::Abort
                })
            })
            .map_err(transfer_error)?;
        // Server replies are not surfaced; only success or failure matters.
        transfer
            .write_function(|data| Ok(data.len()))
            .map_err(transfer_error)?;
        transfer.perform().map_err(transfer_error)?;
        Ok(())
    }
}

/// A recorded call to [`MockUploader::upload`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub url: String,
    pub username: String,
    pub local_file: PathBuf,
}

/// Test double that records uploads and optionally fails them.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Default)]
pub struct MockUploader {
    failure: Option<String>,
    calls: Arc<Mutex<Vec<UploadCall>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose every upload fails with `detail` as the transfer error.
    pub fn with_failure(detail: impl Into<String>) -> Self {
        Self {
            failure: Some(detail.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls().len()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Uploader for MockUploader {
    fn upload(&self, target: &UploadTarget, url: &str, local_file: &Path) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(UploadCall {
                url: url.to_string(),
                username: target.username.clone(),
                local_file: local_file.to_path_buf(),
            });
        }
        match &self.failure {
            Some(detail) => Err(BackupError::Upload {
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}
