// Orchestrator: scan -> archive -> re-measure -> upload, with the status
// lines a user watches while the backup runs.

use crate::archive::{self, ArchiveCommand, ArchiveJob};
use crate::error::{BackupError, Result};
use crate::inspect::{self, DirectorySummary};
use crate::upload::{UploadTarget, Uploader};
use chrono::NaiveDate;
use indicatif::ProgressBar;
use std::io::Write;
use std::path::PathBuf;

/// Everything one run needs. Date and output directory are supplied by the
/// caller so a run is reproducible with fixed inputs.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub date: NaiveDate,
    pub archiver: String,
    pub target: UploadTarget,
    pub show_progress: bool,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub artifact_path: PathBuf,
    pub remote_url: String,
    pub files_archived: u64,
    /// Directory size measured after archiving; informational only.
    pub summary_after: Option<DirectorySummary>,
}

/// `DD-MM-YYYY-backup.tar.gz`
pub fn artifact_name(date: NaiveDate) -> String {
    format!("{}-backup.tar.gz", date.format("%d-%m-%Y"))
}

/// Run one backup. Any stage failure ends the run; the artifact is left on
/// disk either way.
pub fn run(plan: &BackupPlan, uploader: &dyn Uploader, out: &mut dyn Write) -> Result<RunReport> {
    let name = artifact_name(plan.date);
    let artifact_path = archive::artifact_path(&plan.output_dir, &name);

    // Status lines are best-effort: a closed stdout must not turn a finished
    // backup into a failure, so write errors on `out` are dropped.
    writeln!(
        out,
        "Creating tar.gz archive from directory: {}",
        plan.source_dir.display()
    )
    .ok();

    let before = inspect::summarize(&plan.source_dir)?;
    if before.file_count == 0 {
        return Err(BackupError::EmptySource(plan.source_dir.clone()));
    }

    let job = ArchiveJob {
        source_dir: plan.source_dir.clone(),
        artifact_path: artifact_path.clone(),
        expected_file_count: before.file_count,
    };
    let command = ArchiveCommand::tar(plan.archiver.as_str(), &job);
    let bar = if plan.show_progress {
        archive::progress_bar(job.expected_file_count)
    } else {
        ProgressBar::hidden()
    };
    let progress = match archive::build_archive(&job, &command, &bar) {
        Ok(progress) => progress,
        Err(err) => {
            if let Ok(meta) = std::fs::metadata(&artifact_path) {
                writeln!(out, "{name} size: {} bytes (incomplete)", meta.len()).ok();
            }
            return Err(err);
        }
    };

    let summary_after = match inspect::summarize(&plan.source_dir) {
        Ok(summary) => {
            writeln!(out, "{name} size: {} bytes\n", summary.total_bytes).ok();
            Some(summary)
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not re-measure source directory");
            None
        }
    };

    let remote_url = plan.target.remote_url(&name);
    writeln!(out, "Uploading to FTP server: {}", plan.target.host).ok();
    writeln!(out, "Port: {}", plan.target.port).ok();
    writeln!(out, "Username: {}", plan.target.username).ok();

    uploader.upload(&plan.target, &remote_url, &artifact_path)?;
    writeln!(out, "{name} uploaded to {remote_url}").ok();
    writeln!(out, "Backup and upload completed successfully").ok();

    Ok(RunReport {
        artifact_path,
        remote_url,
        files_archived: progress.files_processed(),
        summary_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::upload::MockUploader;
    use std::fs;
    use std::path::Path;

    const PASSWORD: &str = "pa55-w0rd-never-shown";

    fn plan(source: &Path, output: &Path, archiver: &str) -> BackupPlan {
        BackupPlan {
            source_dir: source.to_path_buf(),
            output_dir: output.to_path_buf(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            archiver: archiver.into(),
            target: UploadTarget {
                host: "example.com".into(),
                port: "21".into(),
                username: "backup".into(),
                password: PASSWORD.into(),
            },
            show_progress: false,
        }
    }

    fn three_files() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("a"), vec![1u8; 100]).unwrap();
        fs::write(dir.path().join("b"), vec![2u8; 100]).unwrap();
        fs::write(dir.path().join("docs/c"), vec![3u8; 100]).unwrap();
        dir
    }

    #[test]
    fn artifact_name_is_day_month_year() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
        assert_eq!(artifact_name(date), "05-11-2023-backup.tar.gz");
    }

    #[test]
    fn empty_tree_aborts_at_scan_without_upload() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("only/dirs")).unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let uploader = MockUploader::new();
        let mut out = Vec::new();

        let err = run(&plan(src.path(), out_dir.path(), "false"), &uploader, &mut out).unwrap_err();
        assert_eq!(err.stage(), Stage::Scan);
        assert_eq!(uploader.total_calls(), 0);
        assert!(!out_dir.path().join("01-01-2024-backup.tar.gz").exists());
    }

    #[test]
    fn unreadable_root_aborts_at_scan() {
        let out_dir = tempfile::tempdir().unwrap();
        let missing = out_dir.path().join("missing");
        let err = run(&plan(&missing, out_dir.path(), "tar"), &MockUploader::new(), &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Scan);
    }

    #[test]
    fn failing_archiver_skips_upload() {
        let src = three_files();
        let out_dir = tempfile::tempdir().unwrap();
        let uploader = MockUploader::new();

        let err = run(&plan(src.path(), out_dir.path(), "false"), &uploader, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, BackupError::Archive { .. }));
        assert_eq!(err.stage(), Stage::Archive);
        assert_eq!(uploader.total_calls(), 0);
    }

    #[test]
    fn password_never_reaches_output_or_errors() {
        let src = three_files();
        let out_dir = tempfile::tempdir().unwrap();
        let uploader = MockUploader::with_failure("Access denied: 530");
        let mut out = Vec::new();

        let err = run(&plan(src.path(), out_dir.path(), "true"), &uploader, &mut out).unwrap_err();
        assert_eq!(err.stage(), Stage::Upload);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Username: backup"));
        assert!(!printed.contains(PASSWORD));
        assert!(!err.to_string().contains(PASSWORD));
        assert!(!format!("{err:?}").contains(PASSWORD));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn unwritable_status_output_does_not_fail_the_run() {
        let src = three_files();
        let out_dir = tempfile::tempdir().unwrap();
        let uploader = MockUploader::new();

        let report = run(&plan(src.path(), out_dir.path(), "true"), &uploader, &mut ClosedPipe)
            .unwrap();
        assert_eq!(uploader.total_calls(), 1);
        assert_eq!(report.remote_url, "ftp://example.com:21/01-01-2024-backup.tar.gz");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn end_to_end_with_real_tar() {
        let src = three_files();
        let out_dir = tempfile::tempdir().unwrap();
        let uploader = MockUploader::new();
        let mut out = Vec::new();

        let report = run(&plan(src.path(), out_dir.path(), "tar"), &uploader, &mut out).unwrap();

        let expected_path = out_dir.path().join("01-01-2024-backup.tar.gz");
        assert_eq!(report.artifact_path, expected_path);
        assert!(expected_path.is_file());
        assert_eq!(report.files_archived, 3);
        assert_eq!(
            report.summary_after,
            Some(DirectorySummary {
                file_count: 3,
                total_bytes: 300
            })
        );
        assert_eq!(report.remote_url, "ftp://example.com:21/01-01-2024-backup.tar.gz");

        let calls = uploader.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, report.remote_url);
        assert_eq!(calls[0].local_file, expected_path);

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("01-01-2024-backup.tar.gz uploaded to ftp://example.com:21/"));
        assert!(printed.contains("Uploading to FTP server: example.com"));
        assert!(printed.ends_with("Backup and upload completed successfully\n"));
    }
}
