// src/color.rs

//! RGB565 color codec for the LED matrix.
//!
//! The matrix stores one 16-bit word per LED: red in bits 15-11, green in
//! bits 10-5 and blue in bits 4-0. `Rgb565` values only come out of
//! [`Rgb565::encode`] (or the named constants below, which are produced by it).

use std::fmt;

/// A packed 5-6-5 color as stored in the mapped framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb565(u16);

// Channel widths after truncation.
const RED_SHIFT_IN: u8 = 3;
const GREEN_SHIFT_IN: u8 = 2;
const BLUE_SHIFT_IN: u8 = 3;

const RED_MASK: u16 = 0x1F;
const GREEN_MASK: u16 = 0x3F;
const BLUE_MASK: u16 = 0x1F;

const RED_OFFSET: u16 = 11;
const GREEN_OFFSET: u16 = 5;

impl Rgb565 {
    pub const OFF: Rgb565 = Rgb565::encode(0, 0, 0);
    pub const WHITE: Rgb565 = Rgb565::encode(255, 255, 255);
    pub const RED: Rgb565 = Rgb565::encode(255, 0, 0);
    pub const GREEN: Rgb565 = Rgb565::encode(0, 255, 0);
    pub const BLUE: Rgb565 = Rgb565::encode(0, 0, 255);
    pub const CYAN: Rgb565 = Rgb565::encode(0, 255, 255);
    pub const MAGENTA: Rgb565 = Rgb565::encode(255, 0, 255);
    pub const YELLOW: Rgb565 = Rgb565::encode(255, 255, 0);

    /// Converts 8-bit-per-channel RGB to RGB565 by dropping the low bits of
    /// each channel.
    pub const fn encode(r: u8, g: u8, b: u8) -> Self {
        let r = (r >> RED_SHIFT_IN) as u16 & RED_MASK;
        let g = (g >> GREEN_SHIFT_IN) as u16 & GREEN_MASK;
        let b = (b >> BLUE_SHIFT_IN) as u16 & BLUE_MASK;
        Rgb565((r << RED_OFFSET) | (g << GREEN_OFFSET) | b)
    }

    /// The raw 16-bit word as written to the device.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Rebuilds a color from a word read back out of the mapped region.
    pub(crate) const fn from_device_word(word: u16) -> Self {
        Rgb565(word)
    }
}

impl fmt::Display for Rgb565 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
