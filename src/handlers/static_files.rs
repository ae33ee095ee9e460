use std::ffi::OsStr;
use std::fs::{ self, File };
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{ Path, PathBuf };

use memmap2::Mmap;
use tracing::warn;

use crate::config::models::Config;
use crate::error::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub mode: u32,
    pub is_dir: bool,
}

/// A resolved file held for one response. The mapping is released exactly
/// once, when this value is dropped.
pub struct MappedFile {
    path: PathBuf,
    meta: FileMeta,
    map: Option<Mmap>,
}

impl MappedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> FileMeta {
        self.meta
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }
}

/// Maps request URLs onto files below a fixed directory.
#[derive(Debug, Clone)]
pub struct DocumentRoot {
    root: PathBuf,
    max_path_len: usize,
    reject_traversal: bool,
}

impl DocumentRoot {
    pub fn new(root: impl Into<PathBuf>, max_path_len: usize, reject_traversal: bool) -> Self {
        Self {
            root: root.into(),
            max_path_len,
            reject_traversal,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.document_root, config.max_path_len, config.reject_traversal)
    }

    /// `root + url`, silently cut to `max_path_len - 1` bytes.
    pub fn real_path(&self, url: &[u8]) -> PathBuf {
        let root = self.root.as_os_str().as_bytes();
        let limit = self.max_path_len.saturating_sub(1);
        let mut bytes = Vec::with_capacity(limit);
        bytes.extend_from_slice(&root[..root.len().min(limit)]);
        let room = limit - bytes.len();
        bytes.extend_from_slice(&url[..url.len().min(room)]);
        PathBuf::from(OsStr::from_bytes(&bytes))
    }

    /// Stats, checks and maps the file behind `url`.
    ///
    /// Missing paths are `NotFound`, files without the world-read bit are
    /// `Forbidden` and directories are `BadRequest`. Failing to open or map
    /// a file that was just stat'ed is `Internal`.
    pub fn resolve(&self, url: &[u8]) -> Result<MappedFile, RequestError> {
        if self.reject_traversal && has_parent_segment(url) {
            return Err(RequestError::Forbidden);
        }

        let path = self.real_path(url);
        let metadata = fs::metadata(&path).map_err(|_| RequestError::NotFound)?;
        let meta = FileMeta {
            size: metadata.len(),
            mode: metadata.permissions().mode(),
            is_dir: metadata.is_dir(),
        };

        if meta.mode & libc::S_IROTH as u32 == 0 {
            return Err(RequestError::Forbidden);
        }
        if meta.is_dir {
            return Err(RequestError::BadRequest);
        }

        let file = File::open(&path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "open failed after stat");
            RequestError::Internal
        })?;
        let map = if meta.size == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only and private to this response.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| {
                warn!(path = %path.display(), error = %e, "mmap failed");
                RequestError::Internal
            })?;
            Some(map)
        };

        Ok(MappedFile { path, meta, map })
    }
}

fn has_parent_segment(url: &[u8]) -> bool {
    url.split(|b| *b == b'/').any(|segment| segment == b"..")
}
