/// Properties of an opened frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// 0 when unknown, e.g. for still images.
    pub fps: f64,
    /// `None` for live sources and containers that do not report a count.
    pub total_frames: Option<usize>,
    /// Human-readable origin, a file path or a camera device.
    pub source: String,
}

impl VideoMetadata {
    pub fn still(width: u32, height: u32, source: impl Into<String>) -> Self {
        Self {
            width,
            height,
            fps: 0.0,
            total_frames: Some(1),
            source: source.into(),
        }
    }
}
