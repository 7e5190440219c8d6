use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// A lazy, finite or unbounded sequence of frames.
///
/// Implementations handle decoding and device access; the pipeline only
/// sees BGR or grayscale [`Frame`]s. A still image is a one-frame source.
pub trait FrameSource: Send {
    /// Acquires the underlying file or device.
    fn open(&mut self) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases the file or device. Must be safe to call more than once.
    fn close(&mut self);

    /// Capture devices report `true`; files and images `false`.
    fn is_live(&self) -> bool {
        false
    }
}
