//! Size-based rotating log file.
//!
//! # Responsibilities
//! - Append log bytes to `dir/name`
//! - Rotate to numbered backups (`name.1` is the newest) past a size limit
//! - Prune backups by count and age
//!
//! Nothing here may emit tracing events: this file is usually the subscriber's
//! own destination and its lock is held while writing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::observability::sink::WriteSync;

const MEGABYTE: u64 = 1024 * 1024;
const DAY_SECS: u64 = 24 * 60 * 60;

struct ActiveFile {
    file: File,
    size: u64,
}

/// A log file that rotates itself.
pub struct RotatingFile {
    path: PathBuf,
    /// Rotate once the file would grow past this many bytes. 0 disables rotation.
    max_size: u64,
    max_backups: usize,
    /// Backups older than this are deleted. `None` keeps them regardless of age.
    max_age: Option<Duration>,
    active: Mutex<ActiveFile>,
}

impl RotatingFile {
    /// Open (or create) `path`, creating parent directories as needed.
    pub fn open(
        path: impl AsRef<Path>,
        max_size_mb: u64,
        max_age_days: u64,
        max_backups: usize,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            max_size: max_size_mb.saturating_mul(MEGABYTE),
            max_backups,
            max_age: (max_age_days > 0)
                .then(|| Duration::from_secs(max_age_days.saturating_mul(DAY_SECS))),
            active: Mutex::new(ActiveFile { file, size }),
        })
    }

    /// Override the size limit in bytes.
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Get the path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `n`-th backup.
    pub fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        active.file.flush()?;

        if self.max_backups == 0 {
            fs::remove_file(&self.path)?;
        } else {
            for n in (1..self.max_backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        active.file = open_append(&self.path)?;
        active.size = 0;

        self.prune_by_age();
        Ok(())
    }

    fn prune_by_age(&self) {
        let Some(max_age) = self.max_age else { return };
        let now = SystemTime::now();

        for n in 1..=self.max_backups {
            let backup = self.backup_path(n);
            let expired = fs::metadata(&backup)
                .and_then(|m| m.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default() > max_age)
                .unwrap_or(false);
            if expired {
                let _ = fs::remove_file(&backup);
            }
        }
    }
}

impl WriteSync for RotatingFile {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self.active.lock();
        if self.max_size > 0 && active.size > 0 && active.size + buf.len() as u64 > self.max_size {
            self.rotate(&mut active)?;
        }
        let n = active.file.write(buf)?;
        active.size += n as u64;
        Ok(n)
    }

    fn sync(&self) -> io::Result<()> {
        let mut active = self.active.lock();
        active.file.flush()?;
        active.file.sync_data()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
