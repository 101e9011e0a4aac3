use std::{
    fs::{self, File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    process,
};

use fs4::FileExt;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Name of the lock file inside the git directory.
pub const LOCK_FILE_NAME: &str = "gitsync.lock";

/// Exclusive advisory lock held for the lifetime of one session.
///
/// The lock lives in the repository's git directory so every working copy of
/// the same repository contends on the same file. The operating system drops
/// the lock when the process exits, so a crashed session never wedges later
/// ones.
#[derive(Debug)]
pub struct SessionLock {
    /// The locked file handle.
    file: File,
    /// Path to the lock file.
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock in `git_dir`, failing fast if another session holds it.
    ///
    /// `repo_dir` only feeds the error message.
    pub fn acquire(git_dir: &Path, repo_dir: &Path) -> Result<Self> {
        let path = git_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if is_contended(&e) {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                return Err(SyncError::SessionInProgress {
                    repo_dir: repo_dir.to_path_buf(),
                    holder: holder_label(&holder),
                });
            }
            return Err(e.into());
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", process::id())?;
        file.flush()?;
        debug!(path = %path.display(), "session lock acquired");

        Ok(Self { file, path })
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    #[allow(clippy::let_underscore_must_use)]
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

/// Whether `e` reports that someone else holds the lock.
fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || (e.raw_os_error().is_some()
            && e.raw_os_error() == fs4::lock_contended_error().raw_os_error())
}

/// Describe the lock holder from the lock file contents.
fn holder_label(contents: &str) -> String {
    match contents.trim() {
        "" => "another gitsync process".to_string(),
        pid => format!("process {pid}"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_session_is_refused_until_the_first_ends() {
        let temp = TempDir::new().unwrap();
        let first = SessionLock::acquire(temp.path(), Path::new("/work/site")).unwrap();
        assert_eq!(
            fs::read_to_string(first.path()).unwrap().trim(),
            process::id().to_string()
        );

        let err = SessionLock::acquire(temp.path(), Path::new("/work/site")).unwrap_err();
        match &err {
            SyncError::SessionInProgress { repo_dir, holder } => {
                assert_eq!(repo_dir, Path::new("/work/site"));
                assert_eq!(holder, &format!("process {}", process::id()));
            }
            other => panic!("unexpected error: {other}"),
        }

        drop(first);
        let again = SessionLock::acquire(temp.path(), Path::new("/work/site"));
        assert!(again.is_ok());
    }

    #[test]
    fn holder_label_handles_empty_files() {
        assert_eq!(holder_label("\n"), "another gitsync process");
        assert_eq!(holder_label("4242\n"), "process 4242");
    }
}
