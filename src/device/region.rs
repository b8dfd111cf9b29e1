// src/device/region.rs

//! The shared memory mapping behind the LED matrix.
//!
//! The region is mapped `MAP_SHARED`, so after `fork` every child addresses
//! the same physical pages as the parent. Nothing here synchronises access
//! between processes: each store is a single aligned 16-bit volatile write,
//! and which process's writes become visible first is left to the scheduler.

use std::ffi::c_void;
use std::io;
use std::os::unix::io::{AsFd, AsRawFd};
use std::ptr::NonNull;

use crate::grid::LED_COUNT;

/// Size of the mapping in bytes: one `u16` per LED.
pub const REGION_BYTES: usize = LED_COUNT * std::mem::size_of::<u16>();

/// Fixed-capacity view of `LED_COUNT` device words.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u16>,
}

impl MappedRegion {
    /// Maps `REGION_BYTES` of `fd` read/write and shared.
    pub fn map<Fd: AsFd>(fd: Fd) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                REGION_BYTES,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_fd().as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr as *mut u16)
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        log::trace!("MappedRegion: mapped {} bytes at {:p}", REGION_BYTES, ptr);
        Ok(Self { ptr })
    }

    /// The only way to address a cell. `None` for `index >= LED_COUNT`.
    fn slot(&self, index: usize) -> Option<*mut u16> {
        if index < LED_COUNT {
            // SAFETY: index is within the LED_COUNT words of the mapping.
            Some(unsafe { self.ptr.as_ptr().add(index) })
        } else {
            None
        }
    }

    /// Stores one word. Returns `false` without touching memory when the
    /// index is outside the region.
    pub fn store(&self, index: usize, word: u16) -> bool {
        match self.slot(index) {
            Some(cell) => {
                // SAFETY: `slot` bounds-checked the cell; the mapping stays
                // valid until `unmap` consumes `self`.
                unsafe { std::ptr::write_volatile(cell, word) };
                true
            }
            None => false,
        }
    }

    /// Reads one word back.
    pub fn load(&self, index: usize) -> Option<u16> {
        self.slot(index)
            .map(|cell| unsafe { std::ptr::read_volatile(cell) })
    }

    /// Releases the mapping.
    pub fn unmap(self) -> io::Result<()> {
        let ptr = self.ptr.as_ptr() as *mut c_void;
        std::mem::forget(self);
        if unsafe { libc::munmap(ptr, REGION_BYTES) } == -1 {
            return Err(io::Error::last_os_error());
        }
        log::trace!("MappedRegion: unmapped {:p}", ptr);
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr.as_ptr() as *mut c_void, REGION_BYTES) };
    }
}
