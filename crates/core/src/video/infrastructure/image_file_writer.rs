use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

/// Writes frames with the `image` crate, swapping BGR back to RGB.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_image(frame: &Frame) -> Result<DynamicImage, Box<dyn std::error::Error>> {
    frame.validate()?;
    let (w, h) = (frame.width(), frame.height());
    if frame.is_gray() {
        let img = GrayImage::from_raw(w, h, frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;
        return Ok(DynamicImage::ImageLuma8(img));
    }
    let mut rgb = frame.data().to_vec();
    for px in rgb.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    let img = RgbImage::from_raw(w, h, rgb).ok_or("Failed to create image from frame data")?;
    Ok(DynamicImage::ImageRgb8(img))
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        to_image(frame)?.save(path)?;
        Ok(())
    }

    fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut bytes = Vec::new();
        to_image(frame)?.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
        Ok(bytes)
    }
}
