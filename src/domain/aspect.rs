use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;

const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;
const PORTRAIT_RATIO: f64 = 9.0 / 16.0;
const RATIO_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Other,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Other => "other",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame size of a video stream. Both sides are guaranteed non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    width: NonZeroU32,
    height: NonZeroU32,
}

impl VideoGeometry {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.width.get()
    }

    pub fn height(&self) -> u32 {
        self.height.get()
    }

    pub fn reduced(&self) -> (u32, u32) {
        reduce(self.width, self.height)
    }

    pub fn orientation(&self) -> Orientation {
        classify(self.width, self.height)
    }
}

pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

pub fn reduce(width: NonZeroU32, height: NonZeroU32) -> (u32, u32) {
    let divisor = gcd(width.get(), height.get());
    (width.get() / divisor, height.get() / divisor)
}

/// Buckets a frame size by its reduced ratio, falling back to a small
/// tolerance around 16:9 and 9:16 for encoder-padded sizes like 854x480.
pub fn classify(width: NonZeroU32, height: NonZeroU32) -> Orientation {
    match reduce(width, height) {
        (16, 9) => Orientation::Landscape,
        (9, 16) => Orientation::Portrait,
        _ => {
            let ratio = f64::from(width.get()) / f64::from(height.get());
            if (ratio - LANDSCAPE_RATIO).abs() < RATIO_TOLERANCE {
                Orientation::Landscape
            } else if (ratio - PORTRAIT_RATIO).abs() < RATIO_TOLERANCE {
                Orientation::Portrait
            } else {
                Orientation::Other
            }
        }
    }
}
