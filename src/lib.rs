//! sense-sched library crate.
//!
//! Drives the Sense HAT 8x8 LED matrix through its memory-mapped framebuffer
//! and uses it to visualise how forked processes of different priority
//! progress through CPU-bound work.

/// RGB565 color codec.
pub mod color;
/// Compiled-in configuration.
pub mod config;
/// Framebuffer lifecycle (open, identity check, mmap, close).
pub mod device;
/// Bounds-checked pixel operations.
pub mod grid;
/// Forked, prioritised workers sharing the mapped matrix.
pub mod sched;

pub use color::Rgb565;
pub use device::{DeviceError, LedMatrix};
pub use grid::{Frame, GridError};
pub use sched::{Demonstrator, RoundError, RoundReport};
