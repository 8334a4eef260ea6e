use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chartlift_types::ChartIdentity;
use tempfile::TempDir;

/// Permissions of staged archives: owner read/write only.
pub const STAGED_FILE_MODE: u32 = 0o600;

/// Directory holding chart archives between download and push.
///
/// One file per artifact name; a run processes charts one at a time, so no
/// two in-flight transfers share a path.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    // Removes the directory on drop when it was created by `temporary`.
    _temp: Option<TempDir>,
}

impl StagingArea {
    /// Fresh private directory under the system temp dir, deleted on drop.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("chartlift-")
            .tempdir()
            .context("failed to create temporary staging directory")?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Use (and create if needed) a caller-provided directory. It is left in
    /// place afterwards.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create staging dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _temp: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of the chart's archive inside the staging directory. Fails with
    /// `InvalidInput` unless the artifact name is one plain path component.
    pub fn staged_path(&self, chart: &ChartIdentity) -> io::Result<PathBuf> {
        let file = chart.artifact_file_name();
        let mut components = Path::new(&file).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if chart.has_plain_artifact_name() => {
                Ok(self.dir.join(file))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("artifact name {file:?} is not a plain file name"),
            )),
        }
    }

    /// Write chart bytes with owner-only permissions and return the path.
    pub fn persist(&self, chart: &ChartIdentity, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.staged_path(chart)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(STAGED_FILE_MODE);
        }

        let mut file = options.open(&path)?;
        // `mode` only applies on creation; tighten a leftover file too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(STAGED_FILE_MODE))?;
        }
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Remove a staged file if it exists. `Ok(false)` when there was nothing
    /// to remove.
    pub fn remove_if_present(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn chart() -> ChartIdentity {
        ChartIdentity::new("redis", "db", "1.0.0")
    }

    #[test]
    fn persist_writes_under_artifact_name() {
        let td = tempdir().expect("tempdir");
        let staging = StagingArea::in_dir(td.path()).expect("staging");

        let path = staging.persist(&chart(), b"archive").expect("persist");
        assert_eq!(path, td.path().join("redis-1.0.0.tgz"));
        assert_eq!(fs::read(&path).expect("read"), b"archive");
    }

    #[cfg(unix)]
    #[test]
    fn persist_uses_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let td = tempdir().expect("tempdir");
        let staging = StagingArea::in_dir(td.path()).expect("staging");
        let path = staging.staged_path(&chart()).expect("path");
        fs::write(&path, b"old").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        staging.persist(&chart(), b"new").expect("persist");
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(fs::read(&path).expect("read"), b"new");
    }

    #[test]
    fn remove_if_present_is_a_noop_for_missing_files() {
        let td = tempdir().expect("tempdir");
        let staging = StagingArea::in_dir(td.path()).expect("staging");
        let path = staging.staged_path(&chart()).expect("path");

        assert!(!staging.remove_if_present(&path).expect("remove"));
        fs::write(&path, b"x").expect("write");
        assert!(staging.remove_if_present(&path).expect("remove"));
        assert!(!path.exists());
    }

    #[test]
    fn remove_if_present_reports_real_errors() {
        let td = tempdir().expect("tempdir");
        let staging = StagingArea::in_dir(td.path()).expect("staging");
        let path = staging.staged_path(&chart()).expect("path");
        fs::create_dir(&path).expect("mkdir");

        assert!(staging.remove_if_present(&path).is_err());
    }

    #[test]
    fn names_that_leave_the_directory_are_rejected() {
        let td = tempdir().expect("tempdir");
        let staging = StagingArea::in_dir(&td.path().join("stage")).expect("staging");
        let victim = td.path().join("victim-1.0.0.tgz");
        fs::write(&victim, b"keep").expect("write");

        for chart in [
            ChartIdentity::new("../victim", "db", "1.0.0"),
            ChartIdentity::new("nested/redis", "db", "1.0.0"),
            ChartIdentity::new("redis", "db", "1.0.0/../../victim"),
        ] {
            let err = staging.staged_path(&chart).expect_err("unsafe name");
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            let err = staging.persist(&chart, b"evil").expect_err("unsafe name");
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert_eq!(fs::read(&victim).expect("read"), b"keep");
    }

    #[test]
    fn in_dir_creates_missing_directories() {
        let td = tempdir().expect("tempdir");
        let nested = td.path().join("a/b");
        let staging = StagingArea::in_dir(&nested).expect("staging");
        assert!(nested.is_dir());
        assert_eq!(staging.path(), nested.as_path());
    }

    #[test]
    fn temporary_directory_is_removed_on_drop() {
        let staging = StagingArea::temporary().expect("staging");
        let dir = staging.path().to_path_buf();
        staging.persist(&chart(), b"x").expect("persist");
        assert!(dir.is_dir());

        drop(staging);
        assert!(!dir.exists());
    }
}
