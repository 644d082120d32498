//! Durable append-only fault log.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::Fault;

/// Suffix appended to the file stem of the rotated generation.
const ROTATED_SUFFIX: &str = "_old";

const BANNER_RULE: &str = "####################################################";

/// Formats a timestamp the way every fault log line starts.
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y/%-m/%-d/%-H:%M:%S").to_string()
}

/// Returns the sibling path holding the previous generation.
pub fn rotated_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, ROTATED_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, ROTATED_SUFFIX),
    };
    path.with_file_name(name)
}

/// Process-wide fault log with one line per fault.
pub struct FaultLog {
    path: PathBuf,
    file: File,
}

impl FaultLog {
    /// Opens the log, rotating it first when it has grown past `max_bytes`.
    ///
    /// At most two generations are kept. A banner marks every start.
    pub fn open<P: AsRef<Path>>(path: P, max_bytes: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rotated = Self::rotate_if_needed(&path, max_bytes)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut log = Self { path, file };

        let verb = if rotated { "rotated" } else { "opened" };
        log.write_banner(verb)?;
        Ok(log)
    }

    fn rotate_if_needed(path: &Path, max_bytes: u64) -> io::Result<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                warn!("Fault log exists but its size is unknown: {}", e);
                return Ok(false);
            }
        };
        if size <= max_bytes {
            return Ok(false);
        }

        let old = rotated_path(path);
        if old.exists() {
            fs::remove_file(&old)?;
        }
        fs::rename(path, &old)?;
        info!(
            "Fault log {} reached {} bytes, rotated to {}",
            path.display(),
            size,
            old.display()
        );
        Ok(true)
    }

    fn write_banner(&mut self, verb: &str) -> io::Result<()> {
        let banner = format!(
            "{rule}\n#   Error log was {verb} at {ts}\n{rule}\n",
            rule = BANNER_RULE,
            verb = verb,
            ts = format_timestamp(&Local::now())
        );
        self.file.write_all(banner.as_bytes())?;
        self.file.flush()
    }

    /// Appends one fault as a single write.
    pub fn record(&mut self, fault: &Fault) -> io::Result<()> {
        let line = format!(
            "{}| {}\n",
            format_timestamp(&fault.timestamp),
            fault.message
        );
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }

    /// Forces written lines to storage.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Returns the active log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
