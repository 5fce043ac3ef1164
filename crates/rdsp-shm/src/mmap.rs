//! File-backed shared memory: creates or opens the backing file at the path
//! named by the mmap capability key, sizes it, and maps it `MAP_SHARED` so
//! both the local process and anything it `mmap`s the same file into (a
//! peer connection, a worker subprocess) see the same bytes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use shm_primitives::Region;

#[derive(Debug, thiserror::Error)]
pub enum MmapError {
    #[error("failed to open backing file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to size backing file {path:?} to {size} bytes: {source}")]
    Resize {
        path: PathBuf,
        size: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("mmap(2) failed for {path:?}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An open, mapped backing file. Unmaps on drop; the file itself outlives
/// the mapping (other processes may still hold it open).
pub struct MmapFile {
    path: PathBuf,
    file: File,
    ptr: *mut libc::c_void,
    len: usize,
}

unsafe impl Send for MmapFile {}
unsafe impl Sync for MmapFile {}

impl MmapFile {
    /// Creates (or truncates) the file at `path` to `len` bytes and maps it.
    pub fn create(path: impl AsRef<Path>, len: usize) -> Result<Self, MmapError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| MmapError::Open {
                path: path.clone(),
                source,
            })?;
        file.set_len(len as u64)
            .map_err(|source| MmapError::Resize {
                path: path.clone(),
                size: len as u64,
                source,
            })?;
        Self::map(path, file, len)
    }

    /// Opens an existing file and maps its current length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MmapError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| MmapError::Open {
                path: path.clone(),
                source,
            })?;
        let len = file
            .metadata()
            .map_err(|source| MmapError::Open {
                path: path.clone(),
                source,
            })?
            .len() as usize;
        Self::map(path, file, len)
    }

    fn map(path: PathBuf, file: File, len: usize) -> Result<Self, MmapError> {
        use std::os::unix::io::AsRawFd;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(MmapError::Map {
                path,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self {
            path,
            file,
            ptr,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A [`Region`] view over the mapping, valid for as long as this
    /// `MmapFile` stays alive.
    ///
    /// # Safety
    ///
    /// The caller must not let the returned `Region` outlive `self`.
    pub unsafe fn region(&self) -> Region {
        unsafe { Region::from_raw_parts(self.ptr as *mut u8, self.len) }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Drop for MmapFile {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}
