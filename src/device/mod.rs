// src/device/mod.rs
//
// Device lifecycle: open the Sense HAT framebuffer, verify it is the LED
// matrix, map its 128 bytes and later unmap and close it again.

pub mod fbinfo;
pub mod region;

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::DeviceConfig;
use region::{MappedRegion, REGION_BYTES};

/// Set while a hardware-backed handle exists in this process.
static DEVICE_OPEN: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("failed to query fixed screen info of {path}: {source}")]
    Query { path: String, source: nix::Error },
    #[error("wrong device found at {path}: identity '{found}', expected '{expected}'")]
    Identity {
        path: String,
        found: String,
        expected: String,
    },
    #[error("failed to map {path}: {source}")]
    Map { path: String, source: io::Error },
    #[error("failed to release LED matrix (munmap: {}, close: {})", describe(.unmap), describe(.close))]
    Close {
        unmap: Option<io::Error>,
        close: Option<io::Error>,
    },
    #[error("{path} is already open in this process")]
    AlreadyOpen { path: String },
    #[error("LED matrix has already been closed")]
    Released,
}

fn describe(step: &Option<io::Error>) -> String {
    match step {
        Some(e) => e.to_string(),
        None => "ok".to_string(),
    }
}

/// Owned handle to the mapped LED matrix.
///
/// Forked children inherit the handle together with the shared mapping and
/// write to the same physical memory as the parent. Only the process that
/// opened the matrix may close it, and only after every child has exited.
/// At most one hardware-backed handle exists per process.
#[derive(Debug)]
pub struct LedMatrix {
    label: String,
    identity: String,
    fd: Option<OwnedFd>,
    region: Option<MappedRegion>,
    exclusive: bool,
}

impl LedMatrix {
    /// Opens the framebuffer described by `config`, checks its identity and
    /// maps it. Everything acquired so far is released on failure.
    pub fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
        if DEVICE_OPEN.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::AlreadyOpen {
                path: config.path.clone(),
            });
        }
        match Self::open_device(config) {
            Ok(mut matrix) => {
                matrix.exclusive = true;
                info!(
                    "LedMatrix: mapped '{}' at {} ({} bytes)",
                    matrix.identity, matrix.label, REGION_BYTES
                );
                Ok(matrix)
            }
            Err(e) => {
                DEVICE_OPEN.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn open_device(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let path = config.path.clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| DeviceError::Open {
                path: path.clone(),
                source,
            })?;
        let fd: OwnedFd = file.into();
        debug!("LedMatrix: opened {} as fd {}", path, fd.as_raw_fd());

        let info = fbinfo::query(&fd).map_err(|source| DeviceError::Query {
            path: path.clone(),
            source,
        })?;
        let found = info.identity();
        if !fbinfo::matches_identity(&found, &config.identity) {
            return Err(DeviceError::Identity {
                path,
                found,
                expected: config.identity.clone(),
            });
        }

        Self::map_backing(path, found, fd)
    }

    /// Backs a handle with an anonymous shared memory file instead of the
    /// hardware. Mapped exactly like the device, so forked workers and the
    /// parent see the same words; no identity check is performed.
    pub fn in_memory() -> Result<Self, DeviceError> {
        let label = "memfd:sense-sched".to_string();
        let raw_fd = unsafe { libc::memfd_create(c"sense-sched".as_ptr(), libc::MFD_CLOEXEC) };
        if raw_fd < 0 {
            return Err(DeviceError::Open {
                path: label,
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: memfd_create just returned this descriptor and nothing else owns it.
        let backing = File::from(unsafe { OwnedFd::from_raw_fd(raw_fd) });
        // A fresh memfd is empty; mapping it needs the full region size.
        backing
            .set_len(REGION_BYTES as u64)
            .map_err(|source| DeviceError::Map {
                path: label.clone(),
                source,
            })?;
        debug!("LedMatrix: created {} as fd {}", label, raw_fd);
        Self::map_backing(label, "in-memory".to_string(), backing.into())
    }

    fn map_backing(label: String, identity: String, fd: OwnedFd) -> Result<Self, DeviceError> {
        // `fd` is dropped (closed) on the error path.
        let region = MappedRegion::map(&fd).map_err(|source| DeviceError::Map {
            path: label.clone(),
            source,
        })?;
        Ok(Self {
            label,
            identity,
            fd: Some(fd),
            region: Some(region),
            exclusive: false,
        })
    }

    /// The verified identity string of the device.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Path (or memfd label) the handle was opened from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_open(&self) -> bool {
        self.region.is_some()
    }

    /// Validity check performed by every pixel operation.
    pub(crate) fn region(&self) -> Option<&MappedRegion> {
        self.region.as_ref()
    }

    /// Unmaps the region and closes the descriptor. Both steps are attempted
    /// even if the first one fails. Any later pixel operation is rejected.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        let (region, fd) = match (self.region.take(), self.fd.take()) {
            (None, None) => return Err(DeviceError::Released),
            pair => pair,
        };
        if std::mem::take(&mut self.exclusive) {
            DEVICE_OPEN.store(false, Ordering::Release);
        }

        let unmap = region.and_then(|region| region.unmap().err());
        if let Some(e) = &unmap {
            warn!("LedMatrix: munmap of {} failed: {}", self.label, e);
        }

        let close = fd.and_then(|fd| {
            let raw_fd = fd.into_raw_fd();
            if unsafe { libc::close(raw_fd) } == -1 {
                Some(io::Error::last_os_error())
            } else {
                None
            }
        });
        if let Some(e) = &close {
            warn!("LedMatrix: close of {} failed: {}", self.label, e);
        }

        if unmap.is_some() || close.is_some() {
            return Err(DeviceError::Close { unmap, close });
        }
        info!("LedMatrix: closed {}", self.label);
        Ok(())
    }
}

impl Drop for LedMatrix {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(
                "LedMatrix: {} dropped without close, releasing it now",
                self.label
            );
            if let Err(e) = self.close() {
                warn!("LedMatrix: release on drop failed: {}", e);
            }
        }
    }
}
