//! Crash-safe persistence for the SentinelGate state document.
//!
//! One JSON file, one writer protocol: in-process mutex → advisory
//! cross-process lock on `<path>.lock` → copy current file to
//! `<path>.bak` → write `<path>.tmp` with owner-only permissions →
//! fsync → atomic rename. A reader never observes a truncated document;
//! after a crash the file is either the old or the new content.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use sg_domain::model::AppState;
use sg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle on the persisted state document. Cheap to share behind an
/// `Arc`; all savers in this process serialize on the internal mutex.
pub struct StateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the document. A missing file yields `AppState::default_state()`
    /// without writing anything; corrupt JSON fails loudly so the caller
    /// can decide whether to fall back to the backup.
    pub fn load(&self) -> Result<AppState> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no state file, starting from defaults");
            return Ok(AppState::default_state());
        }
        self.warn_if_permissive();
        let data = fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            Error::Persistence(format!(
                "corrupt state file {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Load the `.bak` sibling written by the previous successful save.
    pub fn load_backup(&self) -> Result<AppState> {
        let bak = self.backup_path();
        if !bak.exists() {
            return Err(Error::NotFound(format!("no backup at {}", bak.display())));
        }
        let data = fs::read_to_string(&bak)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::Persistence(format!("corrupt backup {}: {e}", bak.display())))
    }

    /// Persist the document durably. Stamps and returns `updated_at`.
    ///
    /// The write is retried once; a second failure surfaces as
    /// `Error::Persistence` and leaves the previous on-disk content
    /// intact (the rename never happened).
    pub fn save(&self, state: &AppState) -> Result<DateTime<Utc>> {
        let _in_process = self.write_lock.lock();

        // Advisory cross-process lock. Held for the whole protocol so a
        // second process cannot interleave its backup/rename with ours.
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| Error::Persistence(format!("opening lock file: {e}")))?;
        let mut file_lock = fd_lock::RwLock::new(lock_file);
        let _guard = file_lock
            .write()
            .map_err(|e| Error::Persistence(format!("acquiring file lock: {e}")))?;

        let mut doc = state.clone();
        doc.updated_at = Utc::now();

        match self.write_once(&doc) {
            Ok(()) => Ok(doc.updated_at),
            Err(first) => {
                tracing::warn!(error = %first, "state save failed, retrying once");
                self.write_once(&doc)
                    .map_err(|e| Error::Persistence(format!("state save failed twice: {e}")))?;
                Ok(doc.updated_at)
            }
        }
    }

    // ── internals ────────────────────────────────────────────────────

    fn write_once(&self, doc: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Preserve the last good document before touching anything.
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }

        let mut json = serde_json::to_string_pretty(doc)?;
        json.push('\n');

        let tmp = self.tmp_path();
        {
            let mut options = OpenOptions::new();
            options.create(true).truncate(true).write(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        // Atomic on the same filesystem: readers see old or new, never a
        // partial write.
        fs::rename(&tmp, &self.path)?;
        restrict_permissions(&self.path);
        Ok(())
    }

    fn warn_if_permissive(&self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(&self.path) {
                let mode = meta.permissions().mode() & 0o777;
                if mode & 0o077 != 0 {
                    tracing::warn!(
                        path = %self.path.display(),
                        mode = format!("{mode:o}"),
                        "state file is readable by group/other; expected owner-only"
                    );
                }
            }
        }
    }

    fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "bak")
    }

    fn tmp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }
}

/// `state.json` → `state.json.<ext>`.
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::warn!(path = %path.display(), error = %e, "failed to restrict state file mode");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_appends_extension() {
        assert_eq!(
            sibling(Path::new("/tmp/state.json"), "bak"),
            PathBuf::from("/tmp/state.json.bak")
        );
    }
}
