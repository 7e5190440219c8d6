use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::{Frame, FrameError};
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

#[derive(Error, Debug)]
pub enum ImageInputError {
    #[error("unsupported image type {0} (expected one of: {exts})", exts = IMAGE_EXTENSIONS.join(", "))]
    UnsupportedExtension(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes encoded image bytes (an upload, a file body) into a frame.
///
/// Grayscale images stay single-channel; everything else becomes BGR.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, ImageInputError> {
    let image = image::load_from_memory(bytes)?;
    Ok(frame_from_image(image)?)
}

pub fn read_image_file(path: &Path) -> Result<Frame, ImageInputError> {
    if !is_supported_image(path) {
        return Err(ImageInputError::UnsupportedExtension(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| ImageInputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image_bytes(&bytes)
}

fn frame_from_image(image: DynamicImage) -> Result<Frame, FrameError> {
    let (width, height) = (image.width(), image.height());
    let is_gray = matches!(
        image,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    );
    if is_gray {
        return Frame::try_new(image.into_luma8().into_raw(), width, height, 1, 0);
    }
    let mut data = image.into_rgb8().into_raw();
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    Frame::try_new(data, width, height, 3, 0)
}

/// Adapts a single image file to the [`FrameSource`] interface as a
/// one-frame stream.
pub struct ImageFileReader {
    path: PathBuf,
    frame: Option<Frame>,
}

impl ImageFileReader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            frame: None,
        }
    }
}

impl FrameSource for ImageFileReader {
    fn open(&mut self) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let frame = read_image_file(&self.path)?;
        let metadata = VideoMetadata::still(
            frame.width(),
            frame.height(),
            self.path.display().to_string(),
        );
        self.frame = Some(frame);
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        if self.frame.is_none() {
            return Box::new(std::iter::once(Err("ImageFileReader: not opened".into())));
        }
        Box::new(self.frame.take().into_iter().map(Ok))
    }

    fn close(&mut self) {
        self.frame = None;
    }
}
