use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use memmap2::Mmap;
use nix::unistd::{Uid, User};
use tracing::debug;

use crate::TransferError;

/// The local file being broadcast, mapped read-only for its whole length.
///
/// The mapping lives as long as the `SourceFile`. The file must not be
/// modified while a broadcast is reading it; a concurrent truncation would
/// fault the process.
pub struct SourceFile {
    path: PathBuf,
    // Held so the descriptor outlives the mapping.
    _file: File,
    len: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: i64,
    mtime: i64,
    ctime: i64,
    /// `None` for zero-length files, which cannot be mapped.
    map: Option<Mmap>,
}

impl SourceFile {
    /// Opens, stats and maps `path`.
    ///
    /// Nothing is kept when any step fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let access_err = |source| TransferError::FileAccess {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(access_err)?;
        let meta = file.metadata().map_err(access_err)?;
        if !meta.is_file() {
            return Err(access_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let len = meta.len();
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and the file is documented as
            // immutable for the lifetime of the broadcast.
            let map = unsafe { Mmap::map(&file) }.map_err(|source| TransferError::Mapping {
                path: path.clone(),
                source,
            })?;
            Some(map)
        };

        let source = Self {
            path,
            _file: file,
            len,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
            map,
        };
        source.log_state();
        Ok(source)
    }

    fn log_state(&self) {
        debug!(path = %self.path.display(), "modes    = {:o}", self.mode);
        debug!("uid      = {}", self.uid);
        debug!("gid      = {}", self.gid);
        debug!("atime    = {}", ctime_string(self.atime));
        debug!("mtime    = {}", ctime_string(self.mtime));
        debug!("ctime    = {}", ctime_string(self.ctime));
        debug!("size     = {}", self.len);
    }

    /// The whole file content.
    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Full `st_mode`, file type bits included.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Last access time, seconds since the epoch.
    pub fn atime(&self) -> i64 {
        self.atime
    }

    /// Last modification time, seconds since the epoch.
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Name of the file's owner.
    pub fn owner_name(&self) -> String {
        username_for_uid(self.uid)
    }
}

/// Resolves a uid through the system user database.
///
/// Unknown uids (and lookup failures) resolve to `nobody`.
pub fn username_for_uid(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        Ok(None) => "nobody".into(),
        Err(e) => {
            debug!(uid, error = %e, "user lookup failed");
            "nobody".into()
        }
    }
}

fn ctime_string(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(t) => t.with_timezone(&Local).format("%a %b %d %H:%M:%S %Y").to_string(),
        None => secs.to_string(),
    }
}
