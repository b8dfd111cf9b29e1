// src/device/tests.rs

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

use super::{DeviceError, LedMatrix, DEVICE_OPEN};
use crate::color::Rgb565;
use crate::config::DeviceConfig;

// Tests calling LedMatrix::open share the process-wide reservation.
static OPEN_LOCK: Mutex<()> = Mutex::new(());

fn open_guard() -> MutexGuard<'static, ()> {
    OPEN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn config_for(path: &str) -> DeviceConfig {
    DeviceConfig {
        path: path.to_string(),
        ..DeviceConfig::default()
    }
}

#[test_log::test]
fn open_fails_for_a_missing_device() {
    let _guard = open_guard();
    let err = LedMatrix::open(&config_for("/dev/this-framebuffer-does-not-exist")).unwrap_err();
    assert!(matches!(err, DeviceError::Open { .. }), "got {:?}", err);
}

#[test_log::test]
fn open_fails_when_the_file_is_not_a_framebuffer() {
    let _guard = open_guard();
    let err = LedMatrix::open(&config_for("/dev/null")).unwrap_err();
    assert!(matches!(err, DeviceError::Query { .. }), "got {:?}", err);
}

#[test_log::test]
fn in_memory_matrix_starts_open_and_zeroed() {
    let mut matrix = LedMatrix::in_memory().unwrap();
    assert!(matrix.is_open());
    assert_eq!(matrix.identity(), "in-memory");
    assert!(matrix.snapshot().unwrap().iter().all(|&c| c == Rgb565::OFF));
    matrix.close().unwrap();
}

#[test_log::test]
fn close_runs_once() {
    let mut matrix = LedMatrix::in_memory().unwrap();
    matrix.close().unwrap();
    assert!(matches!(matrix.close(), Err(DeviceError::Released)));
}

#[test_log::test]
fn two_handles_on_the_same_backing_share_writes() {
    // Mapping the same memfd twice stands in for parent and child mappings.
    let matrix = LedMatrix::in_memory().unwrap();
    let fd = matrix.fd.as_ref().unwrap().try_clone().unwrap();
    let mut second = LedMatrix::map_backing("second".to_string(), "in-memory".to_string(), fd).unwrap();

    matrix.set_pixel(2, 2, Rgb565::CYAN).unwrap();
    assert_eq!(second.pixel(2, 2).unwrap(), Rgb565::CYAN);

    second.close().unwrap();
    drop(matrix);
}

#[test]
fn close_error_reports_both_steps() {
    let err = DeviceError::Close {
        unmap: None,
        close: Some(std::io::Error::from_raw_os_error(libc::EBADF)),
    };
    let message = err.to_string();
    assert!(message.contains("munmap: ok"), "{}", message);
    assert!(message.contains("close: "), "{}", message);
}

#[test_log::test]
fn second_open_is_refused_before_touching_the_device() {
    let _guard = open_guard();
    DEVICE_OPEN.store(true, Ordering::Release);

    // A missing path would fail with Open if the file were ever opened.
    let err = LedMatrix::open(&config_for("/dev/this-framebuffer-does-not-exist")).unwrap_err();
    DEVICE_OPEN.store(false, Ordering::Release);

    assert!(matches!(err, DeviceError::AlreadyOpen { .. }), "got {:?}", err);
}

#[test_log::test]
fn failed_open_releases_the_reservation() {
    let _guard = open_guard();

    assert!(LedMatrix::open(&config_for("/dev/null")).is_err());
    assert!(!DEVICE_OPEN.load(Ordering::Acquire));

    let err = LedMatrix::open(&config_for("/dev/null")).unwrap_err();
    assert!(matches!(err, DeviceError::Query { .. }), "got {:?}", err);
}

#[test_log::test]
fn in_memory_backing_covers_the_whole_grid() {
    let mut matrix = LedMatrix::in_memory().unwrap();
    matrix.fill(Rgb565::YELLOW).unwrap();
    assert_eq!(matrix.pixel(7, 7).unwrap(), Rgb565::YELLOW);
    matrix.close().unwrap();
}
