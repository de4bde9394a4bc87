//! Checks that captured frames carry a known test pattern.
//!
//! Used by the `vivid` integration tests and by the mock driver's own tests.
//! All validators expect YUYV frames.

use crate::convert::yuyv_to_rgb;
use crate::error::{CameraError, Result};
use crate::traits::Frame;

/// RGB the converter yields for the eight 100% BT.601 color bars, left to
/// right: white, yellow, cyan, green, magenta, red, blue, black.
///
/// The green channel follows the converter's `88 * v - 183 * u` weighting,
/// not studio-swing green.
const COLOR_BARS_RGB: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 255, 11),
    (12, 104, 237),
    (13, 165, 13),
    (237, 85, 237),
    (238, 146, 13),
    (15, 0, 239),
    (16, 16, 16),
];

/// Per-channel slack for color matching.
const COLOR_TOLERANCE: u8 = 15;

/// Horizontal distance between gradient samples, in pixels.
const GRADIENT_STEP: usize = 10;

/// Smallest luma rise across the frame accepted as a gradient.
const GRADIENT_MIN_RISE: u8 = 50;

fn invalid(message: String) -> CameraError {
    CameraError::InvalidFrame(message)
}

fn within_tolerance(actual: (u8, u8, u8), expected: (u8, u8, u8)) -> bool {
    actual.0.abs_diff(expected.0) <= COLOR_TOLERANCE
        && actual.1.abs_diff(expected.1) <= COLOR_TOLERANCE
        && actual.2.abs_diff(expected.2) <= COLOR_TOLERANCE
}

/// Luma samples of the frame's middle row, one every [`GRADIENT_STEP`] pixels.
fn middle_row_luma(frame: &Frame) -> Result<Vec<u8>> {
    let width = frame.width as usize;
    let row = (frame.height / 2) as usize;
    let start = row * width * 2;
    let line = frame
        .data
        .get(start..start + width * 2)
        .ok_or_else(|| invalid(format!("frame too short for row {row}")))?;
    Ok(line.iter().step_by(2 * GRADIENT_STEP).copied().collect())
}

/// Check for eight vertical color bars by sampling the middle of each bar.
///
/// # Errors
///
/// `InvalidFrame` if the frame cannot be converted or a bar's color is off
/// by more than the tolerance.
pub fn validate_color_bars(frame: &Frame) -> Result<()> {
    let rgb = yuyv_to_rgb(&frame.data, frame.width, frame.height)?;
    let width = frame.width as usize;
    let bar_width = width / COLOR_BARS_RGB.len();
    let row = (frame.height / 2) as usize;

    for (bar, &expected) in COLOR_BARS_RGB.iter().enumerate() {
        let x = bar * bar_width + bar_width / 2;
        let at = (row * width + x) * 3;
        let actual = match rgb.get(at..at + 3) {
            Some(&[r, g, b]) => (r, g, b),
            _ => return Err(invalid(format!("no pixel at ({x}, {row})"))),
        };
        if !within_tolerance(actual, expected) {
            return Err(invalid(format!(
                "bar {bar} at ({x}, {row}): expected RGB{expected:?}, got RGB{actual:?}"
            )));
        }
    }
    Ok(())
}

/// Check that luma rises from left to right along the middle row.
///
/// Drops of one level between samples are tolerated.
///
/// # Errors
///
/// `InvalidFrame` if the frame is short, luma falls, or the overall rise
/// is too small for a gradient.
pub fn validate_gradient(frame: &Frame) -> Result<()> {
    let samples = middle_row_luma(frame)?;

    for (i, pair) in samples.windows(2).enumerate() {
        if let &[prev, next] = pair {
            if next.saturating_add(1) < prev {
                return Err(invalid(format!(
                    "luma falls from {prev} to {next} at x={}",
                    (i + 1) * GRADIENT_STEP
                )));
            }
        }
    }

    let rise = match (samples.first(), samples.last()) {
        (Some(&first), Some(&last)) => last.saturating_sub(first),
        _ => 0,
    };
    if rise < GRADIENT_MIN_RISE {
        return Err(invalid(format!(
            "luma rises by {rise}, a gradient needs at least {GRADIENT_MIN_RISE}"
        )));
    }
    Ok(())
}

/// Check that sequence numbers increase by exactly one from frame to frame.
///
/// # Errors
///
/// `InvalidFrame` for an empty slice or any gap.
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    if frames.is_empty() {
        return Err(invalid("no frames to check".to_owned()));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        if let [prev, next] = pair {
            let expected = prev.metadata.sequence.wrapping_add(1);
            if next.metadata.sequence != expected {
                return Err(invalid(format!(
                    "frame {}: expected sequence {expected}, got {}",
                    i + 1,
                    next.metadata.sequence
                )));
            }
        }
    }
    Ok(())
}
