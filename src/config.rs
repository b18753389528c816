// Command line arguments and environment-derived settings.

use crate::upload::UploadTarget;
use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Program name plus the five positionals.
const FULL_ARGC: usize = 6;

/// Archive a directory into DD-MM-YYYY-backup.tar.gz and upload it over FTP.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to back up
    #[arg(allow_hyphen_values = true)]
    pub directory: PathBuf,
    /// FTP server host name
    #[arg(allow_hyphen_values = true)]
    pub ftp_server: String,
    /// FTP server port
    #[arg(allow_hyphen_values = true)]
    pub port: String,
    /// FTP user name
    #[arg(allow_hyphen_values = true)]
    pub username: String,
    /// FTP password
    #[arg(allow_hyphen_values = true)]
    pub password: String,
}

impl Cli {
    /// Parse the command line.
    ///
    /// With exactly five positionals every value is taken literally, so a
    /// password such as `-x1` or `--help` is a password, not a flag. Help and
    /// version flags only apply to shorter command lines.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let mut cmd = Cli::command();
        if args.len() == FULL_ARGC {
            cmd = cmd.disable_help_flag(true).disable_version_flag(true);
        }
        let matches = cmd.try_get_matches_from_mut(args)?;
        Cli::from_arg_matches(&matches).map_err(|err| err.format(&mut cmd))
    }

    /// Parse `std::env::args_os`, exiting on failure.
    ///
    /// Parse errors print only the usage line: clap's own message quotes the
    /// offending token, which may be the password.
    pub fn parse_or_exit() -> Self {
        match Self::try_parse_args(std::env::args_os()) {
            Ok(cli) => cli,
            Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                err.exit()
            }
            Err(_) => {
                eprintln!("{}", Cli::command().render_usage());
                std::process::exit(2);
            }
        }
    }

    pub fn upload_target(&self) -> UploadTarget {
        UploadTarget {
            host: self.ftp_server.clone(),
            port: self.port.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("directory", &self.directory)
            .field("ftp_server", &self.ftp_server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings read from the environment rather than the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Archiver executable, `FTPB_ARCHIVER` or `tar`.
    pub archiver: String,
    /// Where the artifact is written, `FTPB_OUTPUT_DIR` or the working directory.
    pub output_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let archiver = lookup("FTPB_ARCHIVER")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "tar".into());
        let cwd = std::env::current_dir()
            .map_err(|e| anyhow::anyhow!("cannot determine working directory: {e}"))?;
        // The archiver runs with -C <source>, so a relative output path would
        // resolve against the wrong directory.
        let output_dir = match lookup("FTPB_OUTPUT_DIR").filter(|v| !v.is_empty()) {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };
        Ok(Settings {
            archiver,
            output_dir,
        })
    }
}
