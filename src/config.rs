// src/config.rs

//! Compiled-in configuration for the LED matrix scheduling experiment.
//!
//! There are no command line flags and nothing is read from disk: the
//! process-wide [`CONFIG`] is built from the `Default` impls below. The
//! structs still derive serde so the active configuration can be logged.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::color::Rgb565;
use crate::grid::ROW_COUNT;

/// Process-wide configuration.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::default);

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Which framebuffer to open and how to recognise it.
    pub device: DeviceConfig,
    /// Parameters of the fork/nice experiment.
    pub experiment: ExperimentConfig,
}

// --- Device ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Special file of the Sense HAT LED framebuffer.
    pub path: String,
    /// Expected `id` field of the fixed screen info.
    pub identity: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            path: "/dev/fb1".to_string(),
            identity: "RPi-Sense FB".to_string(),
        }
    }
}

// --- Experiment ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Largest round size. Rounds run for 1..=max_children workers.
    pub max_children: usize,
    /// Nice increment applied per worker index (worker n gets n * nice_step).
    pub nice_step: i32,
    /// Iterations of the CPU-bound work unit run before each pixel.
    pub work_iterations: u64,
    /// Color each worker lights its row with.
    pub worker_color: RgbConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            max_children: ROW_COUNT,
            nice_step: 1,
            work_iterations: 100_000_000,
            worker_color: RgbConfig {
                r: 255,
                g: 255,
                b: 255,
            },
        }
    }
}

impl ExperimentConfig {
    /// `max_children` clamped to the rows the matrix actually has.
    pub fn rounds(&self) -> usize {
        self.max_children.clamp(1, ROW_COUNT)
    }
}

/// 8-bit-per-channel color as written in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RgbConfig {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbConfig {
    pub fn to_rgb565(self) -> Rgb565 {
        Rgb565::encode(self.r, self.g, self.b)
    }
}
