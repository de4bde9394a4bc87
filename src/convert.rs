//! YUYV to RGB colour conversion.
//!
//! Integer arithmetic in 8-bit fixed point: red takes `359 * v`, blue
//! `454 * u`, and green `88 * v - 183 * u`, each added to the luma scaled
//! by 256 and shifted back down.

use crate::error::{CameraError, Result};

#[inline]
fn clamp_channel(value: i32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        value.clamp(0, 255) as u8
    }
}

/// Convert one pixel. `y` is the luma already scaled by 256; `u`, `v` are
/// centred on zero.
#[inline]
#[allow(clippy::many_single_char_names)]
fn scaled_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    let r = clamp_channel((y + 359 * v) >> 8);
    let g = clamp_channel((y + 88 * v - 183 * u) >> 8);
    let b = clamp_channel((y + 454 * u) >> 8);
    (r, g, b)
}

/// Convert YUV values to RGB.
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    scaled_to_rgb(
        i32::from(y) << 8,
        i32::from(u) - 128,
        i32::from(v) - 128,
    )
}

/// Convert a packed YUYV frame into interleaved 24-bit RGB.
///
/// Every 4 input bytes `Y0 U Y1 V` encode two horizontally adjacent pixels.
/// The result is `width * height * 3` bytes, row-major.
///
/// # Errors
///
/// Returns [`CameraError::InvalidFrame`] if `width` is odd or `data` holds
/// fewer than `width * height * 2` bytes.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(CameraError::InvalidFrame(format!(
            "YUYV width must be even, got {width}"
        )));
    }

    let pixels = (width as usize) * (height as usize);
    let input = data.get(..pixels * 2).ok_or_else(|| {
        CameraError::InvalidFrame(format!(
            "{width}x{height} YUYV needs {} bytes, got {}",
            pixels * 2,
            data.len()
        ))
    })?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for pair in input.chunks_exact(4) {
        let &[y0, u, y1, v] = pair else {
            continue;
        };
        let u = i32::from(u) - 128;
        let v = i32::from(v) - 128;
        for luma in [y0, y1] {
            let (r, g, b) = scaled_to_rgb(i32::from(luma) << 8, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    Ok(rgb)
}
