use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::video::domain::frame_sink::{FrameSink, SinkStatus};
use crate::video::domain::image_writer::ImageWriter;

use super::image_file_writer::ImageFileWriter;

/// Writes each emitted frame as `frame_000000.jpg`, `frame_000001.jpg`, ...
///
/// With a frame limit the sink reports [`SinkStatus::Disconnected`] once it
/// is reached, ending the stream like a client going away.
pub struct JpegSequenceSink {
    dir: PathBuf,
    writer: Box<dyn ImageWriter>,
    written: usize,
    limit: Option<usize>,
}

impl JpegSequenceSink {
    pub fn new(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Cannot create output directory {}: {e}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            writer: Box::new(ImageFileWriter::new()),
            written: 0,
            limit: None,
        })
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn frame_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("frame_{n:06}.jpg"))
    }
}

impl FrameSink for JpegSequenceSink {
    fn emit(&mut self, frame: &Frame) -> Result<SinkStatus, Box<dyn std::error::Error>> {
        let path = self.frame_path(self.written);
        self.writer.write(&path, frame)?;
        self.written += 1;
        match self.limit {
            Some(limit) if self.written >= limit => Ok(SinkStatus::Disconnected),
            _ => Ok(SinkStatus::Continue),
        }
    }

    fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Wrote {} frame(s) to {}", self.written, self.dir.display());
        Ok(())
    }
}
