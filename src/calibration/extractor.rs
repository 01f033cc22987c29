use super::nms::scanline_nms;
use crate::error::{LfError, Result};
use crate::filters::log_response;
use crate::image::ImageF32;
use crate::lattice::Centroid;
use crate::params::ExtractParams;
use crate::progress::Progress;

use log::debug;

/// Integer micro-image centres found on a white image, plus the LoG response
/// they were detected on (the refiner works on the same map).
#[derive(Clone, Debug)]
pub struct Extraction {
    pub centroids: Vec<Centroid>,
    pub response: ImageF32,
}

pub struct CentroidExtractor {
    params: ExtractParams,
}

impl CentroidExtractor {
    pub fn new(params: ExtractParams) -> Self {
        Self { params }
    }

    /// LoG scale derived from the micro-image diameter.
    pub fn sigma_for_diameter(&self, diameter: usize) -> f64 {
        (diameter as f64 / 4.0) / self.params.sigma_divisor
    }

    pub fn extract(
        &self,
        white: &ImageF32,
        diameter: usize,
        progress: &Progress,
    ) -> Result<Option<Extraction>> {
        if diameter < 2 {
            return Err(LfError::degenerate(format!(
                "micro image diameter {diameter} is too small for peak detection"
            )));
        }
        progress.begin("Extracting micro image centroids");
        let sigma = self.sigma_for_diameter(diameter);
        let len = ((6.0 * sigma).round() as usize).max(3) | 1;
        let response = log_response(white, sigma as f32, len);
        if !progress.busy() {
            return Ok(None);
        }

        let Some(peaks) = scanline_nms(&response, progress) else {
            return Ok(None);
        };
        let strongest = peaks
            .iter()
            .map(|&(x, y)| response.get(x, y))
            .fold(0.0f32, f32::max);
        let floor = strongest * self.params.min_response_ratio;
        let margin = (diameter / 2).saturating_sub(1);
        let (w, h) = (response.w, response.h);
        let inside = |x: usize, y: usize| {
            x >= margin && y >= margin && x + margin < w && y + margin < h
        };
        let centroids: Vec<Centroid> = peaks
            .into_iter()
            .filter(|&(x, y)| {
                let v = response.get(x, y);
                v > 0.0 && v >= floor && inside(x, y)
            })
            .map(|(x, y)| Centroid::new(y as f64, x as f64))
            .collect();
        debug!(
            "extractor: sigma {:.2}, kernel {}, {} centroids kept (margin {})",
            sigma,
            len,
            centroids.len(),
            margin
        );
        Ok(Some(Extraction {
            centroids,
            response,
        }))
    }
}
