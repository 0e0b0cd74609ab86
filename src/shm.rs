//! Shared Pixel Surface
//!
//! Anonymous POSIX shared memory for one frame of pixels. Objects are created
//! with `O_EXCL` under a random name and unlinked immediately, so nothing is
//! left behind in `/dev/shm` even if the process dies. Name collisions are
//! retried up to [`ShmConfig::max_attempts`] times.

use crate::config::ShmConfig;
use crate::error::{EngineError, Result};
use log::{debug, trace};
use memmap2::{MmapMut, MmapOptions};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};

/// Default pixel for regions filled without content: opaque black XRGB
pub const OPAQUE_BLACK: u32 = 0xFF00_0000;

const NAME_SUFFIX_LEN: usize = 6;

/// A mapped, unlinked shared-memory object
pub struct ShmRegion {
    file: File,
    map: MmapMut,
}

impl ShmRegion {
    /// Size of the region in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read access to the mapped bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// Copy `content` into the region, or paint it opaque black when `None`.
    ///
    /// Content shorter than the region leaves the tail black; longer content
    /// is truncated.
    pub fn fill(&mut self, content: Option<&[u8]>) {
        match content {
            Some(bytes) => {
                let n = bytes.len().min(self.map.len());
                self.map[..n].copy_from_slice(&bytes[..n]);
                if n < self.map.len() {
                    paint_black(&mut self.map[n..]);
                }
            }
            None => paint_black(&mut self.map),
        }
    }
}

impl AsFd for ShmRegion {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl std::fmt::Debug for ShmRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmRegion").field("len", &self.len()).finish()
    }
}

fn paint_black(bytes: &mut [u8]) {
    let pixel = OPAQUE_BLACK.to_ne_bytes();
    for chunk in bytes.chunks_exact_mut(4) {
        chunk.copy_from_slice(&pixel);
    }
}

/// Allocate a region of `len` bytes using the configured name prefix
pub fn allocate(len: usize, config: &ShmConfig) -> Result<ShmRegion> {
    let prefix = config.name_prefix.clone();
    allocate_with(len, config.max_attempts, move || next_name(&prefix))
}

fn next_name(prefix: &str) -> String {
    #[cfg(test)]
    let forced = testing::forced_name();
    #[cfg(not(test))]
    let forced: Option<String> = None;
    forced.unwrap_or_else(|| random_name(prefix))
}

/// Allocate with a caller-supplied name source.
///
/// `next_name` is asked for a fresh name after every collision.
pub fn allocate_with<F>(len: usize, max_attempts: u32, mut next_name: F) -> Result<ShmRegion>
where
    F: FnMut() -> String,
{
    if len == 0 {
        return Err(EngineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot allocate an empty shm region",
        )));
    }

    let fd = open_unlinked(max_attempts, &mut next_name)?;
    let file = File::from(fd);
    file.set_len(len as u64)?;

    // SAFETY: the object is unlinked and only shared with the compositor,
    // which never writes to pixel buffers.
    let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

    debug!("Allocated {} byte shm region", len);
    Ok(ShmRegion { file, map })
}

fn open_unlinked<F>(max_attempts: u32, next_name: &mut F) -> Result<OwnedFd>
where
    F: FnMut() -> String,
{
    for attempt in 1..=max_attempts {
        let name = next_name();
        let c_name = CString::new(name.as_str()).map_err(|e| {
            EngineError::Io(io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;

        // SAFETY: c_name is a valid NUL-terminated string for the call.
        let raw = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::mode_t,
            )
        };

        if raw >= 0 {
            // SAFETY: shm_open returned a fresh descriptor we now own.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
            trace!("shm object {} opened on attempt {}", name, attempt);
            return Ok(fd);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(err.into());
        }
        trace!("shm name {} taken, retrying", name);
    }

    Err(EngineError::ResourceExhausted {
        attempts: max_attempts,
    })
}

fn random_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}
