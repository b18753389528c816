// Archive builder: runs the external archiver as a child process and turns
// its verbose listing into a live progress percentage.

use crate::error::{BackupError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// One archiving request. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub source_dir: PathBuf,
    pub artifact_path: PathBuf,
    pub expected_file_count: u64,
}

impl ArchiveJob {
    /// File name of the artifact, used to exclude it from its own contents.
    pub fn artifact_name(&self) -> &OsStr {
        self.artifact_path
            .file_name()
            .unwrap_or(self.artifact_path.as_os_str())
    }
}

/// Files seen so far against the count taken before archiving.
///
/// The percentage may pass 100 when the archiver lists more entries than
/// were counted; that is reported as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    files_processed: u64,
    expected_file_count: u64,
}

impl ProgressState {
    pub fn new(expected_file_count: u64) -> Self {
        Self {
            files_processed: 0,
            expected_file_count,
        }
    }

    /// Count one more archived file and return the new percentage.
    pub fn record(&mut self) -> f64 {
        self.files_processed += 1;
        self.percentage()
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed
    }

    pub fn percentage(&self) -> f64 {
        if self.expected_file_count == 0 {
            return 0.0;
        }
        self.files_processed as f64 / self.expected_file_count as f64 * 100.0
    }
}

/// Whether a line of the archiver's verbose output names an archived file.
///
/// GNU tar prints members as `./path`, directories with a trailing `/`.
/// bsdtar prefixes each member with `a `.
pub fn is_file_entry(line: &str) -> bool {
    let line = line.trim();
    let member = line.strip_prefix("a ").unwrap_or(line);
    member.starts_with("./") && member != "./" && !member.ends_with('/')
}

/// Program plus arguments for the archiver child process.
#[derive(Debug, Clone)]
pub struct ArchiveCommand {
    program: String,
    args: Vec<OsString>,
}

impl ArchiveCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `tar --exclude <name> -czvf <artifact> -C <source> .`
    pub fn tar(program: impl Into<String>, job: &ArchiveJob) -> Self {
        Self::new(program)
            .arg("--exclude")
            .arg(job.artifact_name())
            .arg("-czvf")
            .arg(&job.artifact_path)
            .arg("-C")
            .arg(&job.source_dir)
            .arg(".")
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

/// Single-line progress indicator, `Progress: NN.NN%`, drawn on stderr.
pub fn progress_bar(expected_file_count: u64) -> ProgressBar {
    let bar = ProgressBar::new(expected_file_count);
    if let Ok(style) = ProgressStyle::with_template("Progress: {msg}") {
        bar.set_style(style);
    }
    bar.set_message(format!("{:.2}%", 0.0));
    bar
}

/// Which of the child's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Forward raw lines from one child pipe until end-of-stream.
///
/// Lines are kept as bytes: member names need not be valid UTF-8.
fn spawn_line_reader(
    pipe: impl Read + Send + 'static,
    stream: Stream,
    tx: Sender<(Stream, Vec<u8>)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(pipe).split(b'\n') {
            match line {
                Ok(line) => {
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(?stream, error = %err, "stopped reading archiver output");
                    break;
                }
            }
        }
    })
}

/// Run the archiver for `job`, updating `bar` for every file it reports.
///
/// GNU tar lists members on stdout, bsdtar on stderr, so both pipes are
/// drained concurrently, each on its own reader thread. Both reach
/// end-of-stream before the exit status is collected, so a chatty child can
/// never block on a full pipe. The child is always reaped, even when reading
/// stops early. Stderr lines that are not members are passed through.
pub fn build_archive(
    job: &ArchiveJob,
    command: &ArchiveCommand,
    bar: &ProgressBar,
) -> Result<ProgressState> {
    if job.expected_file_count == 0 {
        return Err(BackupError::EmptySource(job.source_dir.clone()));
    }

    let spawn_error = |source: std::io::Error| BackupError::Spawn {
        program: command.program.clone(),
        source,
    };

    tracing::debug!(program = %command.program, args = ?command.args, "spawning archiver");
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, Stream::Stderr, tx.clone()));
    }
    // The channel closes once both readers hit end-of-stream.
    drop(tx);

    let mut progress = ProgressState::new(job.expected_file_count);
    for (stream, raw) in rx {
        let line = String::from_utf8_lossy(&raw);
        if is_file_entry(&line) {
            let pct = progress.record();
            bar.set_position(progress.files_processed());
            bar.set_message(format!("{pct:.2}%"));
        } else if stream == Stream::Stderr {
            bar.suspend(|| eprintln!("{}", line.trim_end()));
        }
    }
    for reader in readers {
        if reader.join().is_err() {
            tracing::warn!("archiver output reader panicked");
        }
    }
    bar.finish();

    let status = child.wait().map_err(spawn_error)?;
    tracing::debug!(%status, files = progress.files_processed(), "archiver exited");
    if !status.success() {
        return Err(BackupError::Archive {
            program: command.program.clone(),
            status: status.to_string(),
        });
    }
    Ok(progress)
}

/// Path of the artifact inside `output_dir`.
pub fn artifact_path(output_dir: &Path, artifact_name: &str) -> PathBuf {
    output_dir.join(artifact_name)
}
