//! Run-scoped logging.
//!
//! Every record goes to stderr and to `<log_dir>/pantheon-<timestamp>.log`. If the file
//! cannot be created (read-only medium, permissions) we fall back to stderr only.

use chrono::{DateTime, Local};
use env_logger::Target;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Log file name for a run started at `started`.
pub fn log_file_name(started: &DateTime<Local>) -> String {
    format!("pantheon-{}.log", started.format("%Y%m%d-%H%M%S"))
}

/// Writer duplicating every record to the console and the run log.
pub struct Tee<C: Write> {
    console: C,
    file: Option<File>,
}

impl<C: Write> Tee<C> {
    pub fn new(console: C, file: Option<File>) -> Self {
        Self { console, file }
    }
}

impl<C: Write> Write for Tee<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &Path, started: &DateTime<Local>) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(started));
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok((file, path))
}

/// Install the global logger. Returns the log file path when one could be opened.
pub fn init(log_dir: &Path, started: &DateTime<Local>) -> Option<PathBuf> {
    let (file, path) = match open_log_file(log_dir, started) {
        Ok((file, path)) => (Some(file), Some(path)),
        Err(err) => {
            eprintln!(
                "WARNING: cannot open log file in {} ({}); logging to console only",
                log_dir.display(),
                err
            );
            (None, None)
        }
    };

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}: {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee::new(io::stderr(), file))))
        .try_init();

    path
}
