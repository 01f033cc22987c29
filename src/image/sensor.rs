//! Sensor images: one or more equally sized f32 planes.
use super::ImageF32;
use crate::error::{LfError, Result};

/// A white calibration image or a raw light-field capture.
///
/// Colour data is stored planar: one [`ImageF32`] per channel.
#[derive(Clone, Debug)]
pub enum SensorImage {
    Gray(ImageF32),
    Multi(Vec<ImageF32>),
}

impl SensorImage {
    /// Build from planes; a single plane becomes [`SensorImage::Gray`].
    pub fn from_planes(mut planes: Vec<ImageF32>) -> Result<Self> {
        let Some(first) = planes.first() else {
            return Err(LfError::config("sensor image without channels"));
        };
        let (w, h) = (first.w, first.h);
        if planes.iter().any(|p| p.w != w || p.h != h) {
            return Err(LfError::config("sensor channels differ in size"));
        }
        if planes.len() == 1 {
            return Ok(Self::Gray(planes.remove(0)));
        }
        Ok(Self::Multi(planes))
    }

    pub fn planes(&self) -> &[ImageF32] {
        match self {
            Self::Gray(p) => std::slice::from_ref(p),
            Self::Multi(ps) => ps,
        }
    }

    pub fn width(&self) -> usize {
        self.planes().first().map_or(0, |p| p.w)
    }

    pub fn height(&self) -> usize {
        self.planes().first().map_or(0, |p| p.h)
    }

    pub fn channels(&self) -> usize {
        self.planes().len()
    }

    /// `(height, width)`, the order calibration metadata uses.
    pub fn dims(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Apply `f` to every channel.
    pub fn map_planes(&self, mut f: impl FnMut(&ImageF32) -> ImageF32) -> SensorImage {
        match self {
            Self::Gray(p) => Self::Gray(f(p)),
            Self::Multi(ps) => Self::Multi(ps.iter().map(f).collect()),
        }
    }

    /// Channel mean, used for calibration on colour white images.
    pub fn luminance(&self) -> ImageF32 {
        match self {
            Self::Gray(p) => p.clone(),
            Self::Multi(ps) => {
                let w = self.width();
                let h = self.height();
                let inv = 1.0 / ps.len() as f32;
                let mut out = ImageF32::new(w, h);
                for p in ps {
                    for (o, &v) in out.data.iter_mut().zip(&p.data) {
                        *o += v * inv;
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_averages_channels() {
        let a = ImageF32::from_fn(2, 2, |_, _| 0.2);
        let b = ImageF32::from_fn(2, 2, |_, _| 0.6);
        let img = SensorImage::from_planes(vec![a, b]).unwrap();
        assert_eq!(img.channels(), 2);
        let lum = img.luminance();
        assert!((lum.get(1, 1) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn mismatched_planes_are_rejected() {
        let a = ImageF32::new(2, 2);
        let b = ImageF32::new(3, 2);
        assert!(SensorImage::from_planes(vec![a, b]).is_err());
        assert!(SensorImage::from_planes(Vec::new()).is_err());
    }
}
