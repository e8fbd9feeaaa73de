//! Replace-by-rename file primitives.
//!
//! [`atomic_write`] stages content next to the destination and renames it
//! over the canonical path, so readers only ever observe the previous
//! complete file or the new complete file. Only the rename is required to
//! be atomic; a crash while the staging file is written leaves the
//! canonical file untouched.

mod error;

pub use error::{Error, Result};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug)]
pub struct AtomicWriteOptions {
    permissions: Option<u32>,
    prefix:      &'static str,
    suffix:      &'static str,
    sync:        bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self { Self::new() }
}

impl AtomicWriteOptions {
    pub fn new() -> Self {
        Self {
            permissions: None,
            prefix:      ".",
            suffix:      ".tmp",
            sync:        true,
        }
    }

    /// Unix mode bits applied to the staging file before rename. Ignored elsewhere.
    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode);
        self
    }

    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = suffix;
        self
    }

    /// fsync the staging file before it is renamed into place.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Staging path used by [`atomic_write`] for `path`: same directory,
/// file name wrapped in the configured prefix and suffix.
pub fn staging_path(path: impl AsRef<Path>, options: &AtomicWriteOptions) -> Result<PathBuf> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::NoFileName(path.to_path_buf()))?
        .to_string_lossy();
    let parent = path.parent().unwrap_or(Path::new(""));
    Ok(parent.join(format!("{}{}{}", options.prefix, file_name, options.suffix)))
}

pub fn atomic_write(
    path: impl AsRef<Path>,
    content: &[u8],
    options: AtomicWriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = staging_path(path, &options)?;
    let write_err = |source| Error::Write {
        path: tmp_path.clone(),
        source,
    };

    let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
    file.write_all(content).map_err(write_err)?;
    if options.sync {
        file.sync_all().map_err(write_err)?;
    }
    drop(file);

    #[cfg(unix)]
    if let Some(mode) = options.permissions {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode)).map_err(write_err)?;
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(())
}

pub fn atomic_read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`atomic_read`], but a missing file is `Ok(None)`.
pub fn read_if_exists(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
    match atomic_read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
