// src/grid.rs

//! Pixel operations on an open [`LedMatrix`].
//!
//! The matrix is an 8x8 grid stored row-major, `index = row * 8 + col`.
//! Every operation first checks that the handle is still open; single-pixel
//! writes additionally validate the coordinates and reject anything outside
//! the grid without touching memory.

use log::{trace, warn};
use thiserror::Error;

use crate::color::Rgb565;
use crate::device::region::MappedRegion;
use crate::device::LedMatrix;

pub const ROW_COUNT: usize = 8;
pub const COL_COUNT: usize = 8;
pub const LED_COUNT: usize = ROW_COUNT * COL_COUNT;

/// A whole-matrix image in row-major order.
pub type Frame = [Rgb565; LED_COUNT];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("LED ({row}, {col}) does not exist")]
    OutOfBounds { row: usize, col: usize },
    #[error("LED matrix is not open")]
    Released,
}

/// Linear index of `(row, col)`, or `None` if the LED does not exist.
pub fn index_of(row: usize, col: usize) -> Option<usize> {
    if row < ROW_COUNT && col < COL_COUNT {
        Some(row * COL_COUNT + col)
    } else {
        None
    }
}

impl LedMatrix {
    fn open_region(&self) -> Result<&MappedRegion, GridError> {
        self.region().ok_or_else(|| {
            warn!("LedMatrix: pixel operation on closed handle {}", self.label());
            GridError::Released
        })
    }

    /// Sets every LED to `color`.
    pub fn fill(&self, color: Rgb565) -> Result<(), GridError> {
        let region = self.open_region()?;
        for index in 0..LED_COUNT {
            region.store(index, color.bits());
        }
        trace!("LedMatrix: filled with {}", color);
        Ok(())
    }

    /// Turns every LED off.
    pub fn clear(&self) -> Result<(), GridError> {
        self.fill(Rgb565::OFF)
    }

    /// Writes a full image, element `i` to LED `i`.
    pub fn write_frame(&self, frame: &Frame) -> Result<(), GridError> {
        let region = self.open_region()?;
        for (index, color) in frame.iter().enumerate() {
            region.store(index, color.bits());
        }
        Ok(())
    }

    /// Sets a single LED. Coordinates outside the grid are logged and
    /// rejected without writing.
    pub fn set_pixel(&self, row: usize, col: usize, color: Rgb565) -> Result<(), GridError> {
        let region = self.open_region()?;
        let Some(index) = index_of(row, col) else {
            warn!("LED ({}, {}) does not exist!", row, col);
            return Err(GridError::OutOfBounds { row, col });
        };
        region.store(index, color.bits());
        Ok(())
    }

    /// Reads a single LED back from the mapping.
    pub fn pixel(&self, row: usize, col: usize) -> Result<Rgb565, GridError> {
        let region = self.open_region()?;
        index_of(row, col)
            .and_then(|index| region.load(index))
            .map(Rgb565::from_device_word)
            .ok_or(GridError::OutOfBounds { row, col })
    }

    /// Reads the whole matrix back.
    pub fn snapshot(&self) -> Result<Frame, GridError> {
        let region = self.open_region()?;
        let mut frame = [Rgb565::OFF; LED_COUNT];
        for (index, slot) in frame.iter_mut().enumerate() {
            if let Some(word) = region.load(index) {
                *slot = Rgb565::from_device_word(word);
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn matrix() -> LedMatrix {
        LedMatrix::in_memory().expect("memfd-backed matrix")
    }

    #[test_log::test]
    fn index_mapping_is_a_bijection_onto_the_grid() {
        let mut seen = HashSet::new();
        for row in 0..ROW_COUNT {
            for col in 0..COL_COUNT {
                let index = index_of(row, col).unwrap();
                assert!(index < LED_COUNT);
                assert!(seen.insert(index), "duplicate index {}", index);
            }
        }
        assert_eq!(seen.len(), LED_COUNT);
    }

    #[test_log::test]
    fn index_rejects_row_or_col_past_the_edge() {
        assert_eq!(index_of(8, 0), None);
        assert_eq!(index_of(0, 8), None);
        assert_eq!(index_of(7, 7), Some(63));
        assert_eq!(index_of(usize::MAX, usize::MAX), None);
    }

    #[test_log::test]
    fn fill_then_clear_turns_everything_off() {
        let mut matrix = matrix();
        matrix.fill(Rgb565::MAGENTA).unwrap();
        assert!(matrix.snapshot().unwrap().iter().all(|&c| c == Rgb565::MAGENTA));

        matrix.clear().unwrap();
        assert!(matrix.snapshot().unwrap().iter().all(|&c| c == Rgb565::OFF));
        matrix.close().unwrap();
    }

    #[test_log::test]
    fn out_of_bounds_pixels_do_not_touch_neighbours() {
        let mut matrix = matrix();
        matrix.fill(Rgb565::BLUE).unwrap();

        assert_eq!(
            matrix.set_pixel(8, 0, Rgb565::RED),
            Err(GridError::OutOfBounds { row: 8, col: 0 })
        );
        assert_eq!(
            matrix.set_pixel(0, 8, Rgb565::RED),
            Err(GridError::OutOfBounds { row: 0, col: 8 })
        );
        assert_eq!(
            matrix.set_pixel(100, 100, Rgb565::RED),
            Err(GridError::OutOfBounds { row: 100, col: 100 })
        );

        assert!(matrix.snapshot().unwrap().iter().all(|&c| c == Rgb565::BLUE));
        matrix.close().unwrap();
    }

    #[test_log::test]
    fn set_pixel_writes_exactly_one_cell() {
        let mut matrix = matrix();
        matrix.clear().unwrap();
        matrix.set_pixel(3, 5, Rgb565::GREEN).unwrap();

        let frame = matrix.snapshot().unwrap();
        for (index, color) in frame.iter().enumerate() {
            if index == 3 * COL_COUNT + 5 {
                assert_eq!(*color, Rgb565::GREEN);
            } else {
                assert_eq!(*color, Rgb565::OFF, "cell {} changed", index);
            }
        }
        assert_eq!(matrix.pixel(3, 5).unwrap(), Rgb565::GREEN);
        matrix.close().unwrap();
    }

    #[test_log::test]
    fn write_frame_places_elements_row_major() {
        let mut matrix = matrix();
        let mut frame = [Rgb565::OFF; LED_COUNT];
        for row in 0..ROW_COUNT {
            frame[row * COL_COUNT] = Rgb565::RED;
            frame[row * COL_COUNT + COL_COUNT - 1] = Rgb565::YELLOW;
        }
        matrix.write_frame(&frame).unwrap();

        assert_eq!(matrix.snapshot().unwrap(), frame);
        assert_eq!(matrix.pixel(6, 0).unwrap(), Rgb565::RED);
        assert_eq!(matrix.pixel(6, 7).unwrap(), Rgb565::YELLOW);
        assert_eq!(matrix.pixel(6, 3).unwrap(), Rgb565::OFF);
        matrix.close().unwrap();
    }

    #[test_log::test]
    fn operations_after_close_are_rejected() {
        let mut matrix = matrix();
        matrix.close().unwrap();

        assert!(!matrix.is_open());
        assert_eq!(matrix.set_pixel(0, 0, Rgb565::WHITE), Err(GridError::Released));
        assert_eq!(matrix.fill(Rgb565::WHITE), Err(GridError::Released));
        assert_eq!(matrix.clear(), Err(GridError::Released));
        assert_eq!(
            matrix.write_frame(&[Rgb565::WHITE; LED_COUNT]),
            Err(GridError::Released)
        );
        assert_eq!(matrix.snapshot(), Err(GridError::Released));
    }
}
