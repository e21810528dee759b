use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Infected { signature: Option<String> },
}

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("could not start {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    #[error("scanner did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("scanner exited with code {code}: {detail}")]
    Failed { code: i32, detail: String },
    #[error("scanner was terminated by a signal")]
    Terminated,
}

/// Classifies the file at `path`.
pub trait VirusScanner {
    fn scan(&self, path: &Path) -> impl Future<Output = Result<Verdict, ScannerError>> + Send;
}

/// Runs the `clamscan` command line scanner, one process per file.
#[derive(Debug, Clone)]
pub struct ClamScan {
    binary: PathBuf,
    database_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ClamScan {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            database_dir: None,
            timeout,
        }
    }

    pub fn with_database_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let scanner = Self::new(&config.clamscan_path, config.scan_timeout);
        match &config.database_dir {
            Some(dir) => scanner.with_database_dir(dir),
            None => scanner,
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("--stdout").arg("--infected");
        if let Some(dir) = &self.database_dir {
            command.arg(format!("--database={}", dir.display()));
        }
        command
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl VirusScanner for ClamScan {
    async fn scan(&self, path: &Path) -> Result<Verdict, ScannerError> {
        let output = tokio::time::timeout(self.timeout, self.command(path).output())
            .await
            .map_err(|_| ScannerError::TimedOut(self.timeout))?
            .map_err(|source| ScannerError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = Report::parse(&stdout);

        // clamscan: 0 no virus found, 1 virus(es) found, 2 some error occurred
        match output.status.code() {
            Some(0) if report.infected_files > 0 => Ok(Verdict::Infected {
                signature: report.signature,
            }),
            Some(0) => Ok(Verdict::Clean),
            Some(1) => Ok(Verdict::Infected {
                signature: report.signature,
            }),
            Some(code) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = match stderr.trim() {
                    "" => stdout.trim().to_owned(),
                    stderr => stderr.to_owned(),
                };
                Err(ScannerError::Failed { code, detail })
            }
            None => Err(ScannerError::Terminated),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Report {
    signature: Option<String>,
    infected_files: u64,
}

impl Report {
    /// Reads `<path>: <signature> FOUND` detection lines and the
    /// `Infected files: N` summary line.
    fn parse(stdout: &str) -> Self {
        let mut report = Report::default();
        for line in stdout.lines().map(str::trim) {
            if let Some(detection) = line.strip_suffix(" FOUND") {
                if report.signature.is_none() {
                    report.signature = detection
                        .rsplit_once(": ")
                        .map(|(_, signature)| signature.trim().to_owned())
                        .filter(|signature| !signature.is_empty());
                }
                report.infected_files = report.infected_files.max(1);
            } else if let Some(count) = line.strip_prefix("Infected files:") {
                if let Ok(count) = count.trim().parse::<u64>() {
                    report.infected_files = count;
                }
            }
        }
        report
    }
}
