// Entrypoint: parse the five positional arguments, then run one backup.
// A failed stage prints a single error line and exits with that stage's code.

use chrono::Local;
use ftpb::backup::{self, BackupPlan};
use ftpb::config::{Cli, Settings};
use ftpb::logging::init_logging;
use ftpb::upload::FtpUploader;
use std::io::IsTerminal;

fn main() -> anyhow::Result<()> {
    // Prints the usage line to stderr and exits with status 2 on a bad argument count.
    let cli = Cli::parse_or_exit();
    init_logging();
    let settings = Settings::from_env()?;

    let plan = BackupPlan {
        source_dir: cli.directory.clone(),
        output_dir: settings.output_dir,
        date: Local::now().date_naive(),
        archiver: settings.archiver,
        target: cli.upload_target(),
        show_progress: std::io::stderr().is_terminal(),
    };
    tracing::debug!(?cli, "starting backup");

    let mut stdout = std::io::stdout();
    if let Err(err) = backup::run(&plan, &FtpUploader::new(), &mut stdout) {
        eprintln!("Error: {} stage failed: {}", err.stage(), err);
        std::process::exit(err.exit_code());
    }
    Ok(())
}
