// src/device/fbinfo.rs

//! Fixed screen information query (`FBIOGET_FSCREENINFO`) and the identity
//! check performed on it.

use std::os::unix::io::{AsFd, AsRawFd};

const ID_LEN: usize = 16;

/// Mirror of the kernel's `struct fb_fix_screeninfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FixScreenInfo {
    pub id: [libc::c_char; ID_LEN],
    pub smem_start: libc::c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: libc::c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

impl Default for FixScreenInfo {
    fn default() -> Self {
        // SAFETY: plain-old-data struct, all-zero is a valid value.
        unsafe { std::mem::zeroed() }
    }
}

impl FixScreenInfo {
    /// The `id` field up to its first NUL byte.
    pub fn identity(&self) -> String {
        identity_from_raw(&self.id)
    }
}

nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, FixScreenInfo);

/// Reads the fixed screen info of an open framebuffer descriptor.
pub fn query<Fd: AsFd>(fd: Fd) -> nix::Result<FixScreenInfo> {
    let raw_fd = fd.as_fd().as_raw_fd();
    let mut info = FixScreenInfo::default();
    unsafe { fbioget_fscreeninfo(raw_fd, &mut info) }?;
    log::trace!(
        "fbinfo: fd {} reports id '{}', smem_len {}",
        raw_fd,
        info.identity(),
        info.smem_len
    );
    Ok(info)
}

/// Decodes a NUL-padded C identity string.
pub fn identity_from_raw(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Exact match, as `strcmp` would do it.
pub fn matches_identity(found: &str, expected: &str) -> bool {
    found == expected
}
