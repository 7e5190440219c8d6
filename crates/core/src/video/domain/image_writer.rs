use std::path::Path;

use crate::shared::frame::Frame;

/// Encodes single frames as image files or in-memory bytes.
pub trait ImageWriter: Send + Sync {
    /// Writes a frame to `path`; the format follows the file extension.
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Encodes a frame as JPEG bytes.
    fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}
