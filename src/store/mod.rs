//! Config file repository
//!
//! All access to the server config goes through `ConfigStore`: callers never
//! touch the path directly. Writes hold an exclusive advisory lock for the
//! whole read-modify-write cycle and land via temp-file + atomic rename, so
//! a crashed invocation leaves the original file intact and two concurrent
//! invocations serialize instead of racing.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use fs2::FileExt;
use uuid::Uuid;

use crate::error::WgError;

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the raw config text.
    pub fn load(&self) -> Result<String, WgError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WgError::ConfigNotFound(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run a rewrite under the advisory lock and replace the file atomically.
    /// An absent config is surfaced before the closure runs; a closure error
    /// leaves the file untouched.
    pub fn update<F>(&self, rewrite: F) -> Result<(), WgError>
    where
        F: FnOnce(&str) -> Result<String, WgError>,
    {
        let _guard = self.acquire_lock()?;
        let current = self.load()?;
        let next = rewrite(&current)?;
        self.replace(&next)
    }

    fn lock_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".lock");
        PathBuf::from(os)
    }

    fn acquire_lock(&self) -> Result<LockGuard, WgError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        tracing::debug!("[ConfigStore] Acquired lock on {}", self.path.display());
        Ok(LockGuard { file })
    }

    fn replace(&self, text: &str) -> Result<(), WgError> {
        let tmp = self
            .path
            .with_file_name(format!(".{}.tmp", Uuid::new_v4()));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::info!("[ConfigStore] Replaced {}", self.path.display());
        Ok(())
    }
}

struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
