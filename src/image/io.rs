//! Image and JSON I/O.
//!
//! - `load_sensor_image`: read PNG/TIFF/JPEG into normalized f32 planes.
//! - `save_plane_png`: 8-bit preview of a single plane, scaled by its maximum.
//! - `save_planes_u16`: 16-bit PNG/TIFF of 1, 3 or 4 planes in `[0, 1]`.
//! - `write_json_file`: pretty-print a serializable value to disk.
use super::{ImageF32, ImageView, SensorImage};
use crate::error::{LfError, Result};
use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load an image from disk. Gray sources yield one plane; colour sources
/// yield RGB planes (alpha is dropped). Values are normalized to `[0, 1]`.
pub fn load_sensor_image(path: &Path) -> Result<SensorImage> {
    let img = image::open(path)?;
    let w = img.width() as usize;
    let h = img.height() as usize;
    if !img.color().has_color() {
        let raw = img.to_luma32f().into_raw();
        let plane = ImageF32::from_vec(w, h, raw)
            .ok_or_else(|| LfError::config(format!("bad buffer size in {}", path.display())))?;
        return Ok(SensorImage::Gray(plane));
    }
    let raw = img.to_rgb32f().into_raw();
    let mut planes = vec![ImageF32::new(w, h); 3];
    for (i, px) in raw.chunks_exact(3).enumerate() {
        for (c, plane) in planes.iter_mut().enumerate() {
            plane.data[i] = px[c];
        }
    }
    SensorImage::from_planes(planes)
}

/// Save a plane as 8-bit grayscale, mapping `[0, max]` to `[0, 255]`.
pub fn save_plane_png(image: &ImageF32, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let max = image.max_value();
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let mut out = GrayImage::new(image.w as u32, image.h as u32);
    for y in 0..image.h {
        for (x, &px) in image.row(y).iter().enumerate() {
            let v = (px * scale).clamp(0.0, 255.0);
            out.put_pixel(x as u32, y as u32, Luma([v as u8]));
        }
    }
    out.save(path)?;
    Ok(())
}

/// Save interleaved 16-bit samples; values are clamped to `[0, 1]`.
pub fn save_planes_u16(planes: &[ImageF32], path: &Path) -> Result<()> {
    let Some(first) = planes.first() else {
        return Err(LfError::config("nothing to save"));
    };
    let (w, h) = (first.w, first.h);
    let channels = planes.len();
    let mut data = Vec::with_capacity(w * h * channels);
    for i in 0..w * h {
        for p in planes {
            let v = p.data[i].clamp(0.0, 1.0);
            data.push((v * u16::MAX as f32).round() as u16);
        }
    }
    ensure_parent_dir(path)?;
    let bad_buffer = || LfError::config(format!("bad buffer size for {}", path.display()));
    match channels {
        1 => ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, data)
            .ok_or_else(bad_buffer)?
            .save(path)?,
        3 => ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, data)
            .ok_or_else(bad_buffer)?
            .save(path)?,
        4 => ImageBuffer::<Rgba<u16>, Vec<u16>>::from_raw(w as u32, h as u32, data)
            .ok_or_else(bad_buffer)?
            .save(path)?,
        n => {
            return Err(LfError::config(format!(
                "cannot encode {n} channels as an image"
            )))
        }
    }
    Ok(())
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
