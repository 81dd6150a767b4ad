//! Per-user password-reset lock, backed by filesystem markers.
//!
//! A marker file per username rate-limits reset requests: its mtime plus a
//! configured duration is the window during which further requests are
//! refused by the calling flow. The marker survives process restarts and
//! simply ages out if a reset is never completed.
//!
//! There is no atomic check-and-set here: callers read `valid_until`, decide,
//! then `store`. Two concurrent requests for the same user can both pass the
//! check; the guarded resource is a mail send, not a security boundary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Filesystem-backed reset lock for one marker directory.
#[derive(Clone, Debug)]
pub struct ResetLock {
    dir: PathBuf,
    ttl: Duration,
}

impl ResetLock {
    #[must_use]
    pub fn new(dir: PathBuf, ttl_minutes: u64) -> Self {
        Self {
            dir,
            ttl: Duration::from_secs(ttl_minutes * 60),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// When the lock for `username` stops being valid, or `None` if no marker
    /// exists. The returned instant may already be in the past; callers
    /// compare against now themselves.
    ///
    /// # Errors
    /// Propagates filesystem errors other than a missing marker.
    pub fn valid_until(&self, username: &str) -> io::Result<Option<SystemTime>> {
        let path = self.marker_path(username)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(Some(metadata.modified()? + self.ttl)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Create or refresh the marker for `username`, stamped with the current
    /// time. Creates the marker directory if needed.
    ///
    /// # Errors
    /// Propagates filesystem errors.
    pub fn store(&self, username: &str) -> io::Result<()> {
        let path = self.marker_path(username)?;
        fs::create_dir_all(&self.dir)?;
        // Truncating an existing marker refreshes its mtime, which restarts
        // the window.
        fs::write(&path, b"")?;
        Ok(())
    }

    /// Remove the marker for `username`. Removing an absent marker is fine;
    /// callers delete defensively after detecting expiry.
    ///
    /// # Errors
    /// Propagates filesystem errors other than a missing marker.
    pub fn delete(&self, username: &str) -> io::Result<()> {
        let path = self.marker_path(username)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Marker path for a username. The username becomes a single path
    /// component, so anything that could escape the marker directory is
    /// rejected outright.
    fn marker_path(&self, username: &str) -> io::Result<PathBuf> {
        let valid = !username.is_empty()
            && username != "."
            && username != ".."
            && !username.contains(&['/', '\\', '\0'][..]);
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid lock key: {username:?}"),
            ));
        }
        Ok(self.dir.join(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_lock() -> ResetLock {
        let dir = std::env::temp_dir().join(format!("sportello-lock-test-{}", Uuid::new_v4()));
        ResetLock::new(dir, 10)
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn store_makes_lock_valid_into_the_future() {
        let lock = test_lock();
        lock.store("alice").unwrap();

        let valid_until = lock.valid_until("alice").unwrap().unwrap();
        assert!(valid_until > SystemTime::now());

        lock.delete("alice").unwrap();
        assert!(lock.valid_until("alice").unwrap().is_none());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn absent_marker_is_not_an_error() {
        let lock = test_lock();
        assert!(lock.valid_until("alice").unwrap().is_none());
        // Deleting a lock that was never stored must not raise.
        lock.delete("alice").unwrap();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn locks_are_per_username() {
        let lock = test_lock();
        lock.store("alice").unwrap();

        assert!(lock.valid_until("alice").unwrap().is_some());
        assert!(lock.valid_until("bob").unwrap().is_none());

        lock.delete("alice").unwrap();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn store_twice_overwrites() {
        let lock = test_lock();
        lock.store("alice").unwrap();
        let first = lock.valid_until("alice").unwrap().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        lock.store("alice").unwrap();
        let second = lock.valid_until("alice").unwrap().unwrap();

        assert!(second >= first);
        lock.delete("alice").unwrap();
    }

    #[test]
    fn rejects_path_escapes() {
        let lock = test_lock();
        for key in ["", ".", "..", "a/b", "a\\b", "x\0y"] {
            assert!(
                lock.valid_until(key).is_err(),
                "key {key:?} was not rejected"
            );
            assert!(lock.store(key).is_err());
            assert!(lock.delete(key).is_err());
        }
    }
}
