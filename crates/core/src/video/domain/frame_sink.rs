use crate::shared::frame::Frame;

/// Whether the consumer still wants frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    /// The consumer went away; the stream should stop.
    Disconnected,
}

/// Receives annotated frames from a stream, one per loop iteration.
pub trait FrameSink: Send {
    fn emit(&mut self, frame: &Frame) -> Result<SinkStatus, Box<dyn std::error::Error>>;

    /// Called once after the last frame. Default: no-op.
    fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
