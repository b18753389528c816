// Library root
// -----------
// The binary (`main.rs`) parses arguments and hands a `BackupPlan` to
// `backup::run`. Each stage lives in its own module:
// - `inspect`: counts regular files and bytes under the source directory.
// - `archive`: runs the archiver child process and reports progress.
// - `upload`: streams the finished artifact to the FTP server.
// - `backup`: sequences the stages and prints the status lines.
pub mod archive;
pub mod backup;
pub mod config;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod upload;
