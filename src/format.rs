//! Pixel format tags and format descriptors.

use std::fmt;
use std::str::FromStr;

use crate::error::CameraError;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
///
/// The 32-bit identifier is little-endian: the first character is the
/// least-significant byte, so `"YUYV"` is `0x5659_5559`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// The all-zero tag, meaning "let the driver decide".
    pub const UNSPECIFIED: Self = Self([0; 4]);
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Decode a 32-bit format identifier.
    #[must_use]
    pub const fn from_u32(id: u32) -> Self {
        Self(id.to_le_bytes())
    }

    /// Encode as the 32-bit format identifier used by the kernel.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Whether this is the all-zero tag.
    #[must_use]
    pub const fn is_unspecified(self) -> bool {
        self.to_u32() == 0
    }
}

impl From<u32> for FourCC {
    fn from(id: u32) -> Self {
        Self::from_u32(id)
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        fourcc.to_u32()
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

impl FromStr for FourCC {
    type Err = CameraError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = name
            .as_bytes()
            .try_into()
            .map_err(|_| CameraError::InvalidFourCC(name.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

/// Convert a 4-character name to its 32-bit identifier.
pub fn format_id(name: &str) -> crate::Result<u32> {
    name.parse::<FourCC>().map(FourCC::to_u32)
}

/// Convert a 32-bit identifier to its 4-character name.
#[must_use]
pub fn format_name(id: u32) -> String {
    FourCC::from_u32(id).to_string()
}

/// Time per frame as a ratio; frames per second is `denominator / numerator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    /// Seconds numerator.
    pub numerator: u32,
    /// Seconds denominator.
    pub denominator: u32,
}

impl Interval {
    /// Create an interval of `numerator / denominator` seconds.
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Interval for a whole number of frames per second.
    #[must_use]
    pub const fn from_fps(fps: u32) -> Self {
        Self::new(1, fps)
    }

    /// Either half is zero, meaning "leave unchanged" or "unknown".
    #[must_use]
    pub const fn is_unspecified(self) -> bool {
        self.numerator == 0 || self.denominator == 0
    }

    /// Frames per second, if the interval is specified.
    #[must_use]
    pub fn fps(self) -> Option<f64> {
        (!self.is_unspecified()).then(|| f64::from(self.denominator) / f64::from(self.numerator))
    }
}

/// Pixel format, resolution and frame interval of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Format {
    /// Pixel format; [`FourCC::UNSPECIFIED`] asks for the default (YUYV).
    pub fourcc: FourCC,
    /// Frame width in pixels; zero leaves the resolution unchanged.
    pub width: u32,
    /// Frame height in pixels; zero leaves the resolution unchanged.
    pub height: u32,
    /// Frame interval; unspecified leaves the rate unchanged.
    pub interval: Interval,
}

impl Format {
    /// Create a format with an unspecified interval.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            fourcc,
            width,
            height,
            interval: Interval::new(0, 0),
        }
    }

    /// Set the frame interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}x{} fps {}/{}",
            self.fourcc,
            self.width,
            self.height,
            self.interval.denominator,
            self.interval.numerator
        )
    }
}

/// One entry of the driver's pixel format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Enumeration index.
    pub index: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Human-readable description from the driver.
    pub description: String,
    /// Compressed format (e.g. MJPEG).
    pub compressed: bool,
    /// Converted in software by the driver stack rather than native.
    pub emulated: bool,
}

/// A frame size reported by the driver for one pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    /// Exactly one supported size.
    Discrete {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// A range of sizes (continuous ranges are reported with step 1).
    Stepwise {
        /// Minimum width.
        min_width: u32,
        /// Maximum width.
        max_width: u32,
        /// Width step.
        step_width: u32,
        /// Minimum height.
        min_height: u32,
        /// Maximum height.
        max_height: u32,
        /// Height step.
        step_height: u32,
    },
}

/// A frame interval reported by the driver for one format and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInterval {
    /// Exactly one supported interval.
    Discrete(Interval),
    /// A range of intervals (continuous ranges are reported with step 1/1).
    Stepwise {
        /// Shortest interval (highest frame rate).
        min: Interval,
        /// Longest interval (lowest frame rate).
        max: Interval,
        /// Interval step.
        step: Interval,
    },
}
