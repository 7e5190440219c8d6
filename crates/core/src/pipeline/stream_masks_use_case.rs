use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::annotation::domain::frame_annotator::ERROR_TEXT_COLOR;
use crate::pipeline::detect_masks_use_case::{DetectMasksUseCase, PipelineError};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;
use crate::video::domain::frame_sink::{FrameSink, SinkStatus};
use crate::video::domain::frame_source::FrameSource;

const ERROR_FRAME_WIDTH: u32 = 640;
const ERROR_FRAME_HEIGHT: u32 = 360;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{message}: {reason}")]
    CameraOrStreamUnavailable { message: String, reason: String },
    #[error("frame sink failed: {0}")]
    Sink(String),
}

/// Why a stream stopped without an error.
#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    /// The source ran out of frames.
    Exhausted,
    Cancelled,
    /// The sink reported that its consumer went away.
    Disconnected,
    /// The source failed mid-stream.
    ReadFailed(String),
    /// A frame could not be processed.
    FrameRejected(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamSummary {
    pub frames: usize,
    pub faces: usize,
    pub stop: StopReason,
}

/// Releases the source on every exit path.
struct SourceGuard<'a> {
    source: &'a mut dyn FrameSource,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// Runs the single-frame pipeline over a frame source, one frame at a time,
/// emitting each annotated frame to a sink.
///
/// The cancellation flag is checked once per frame.
pub struct StreamMasksUseCase {
    detect: DetectMasksUseCase,
    cancelled: Arc<AtomicBool>,
}

impl StreamMasksUseCase {
    pub fn new(detect: DetectMasksUseCase, cancelled: Option<Arc<AtomicBool>>) -> Self {
        Self {
            detect,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn execute(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        logger: &mut dyn PipelineLogger,
    ) -> Result<StreamSummary, StreamError> {
        let live = source.is_live();
        let mut guard = SourceGuard { source };

        let metadata = match guard.source.open() {
            Ok(metadata) => metadata,
            Err(e) => {
                let message = if live {
                    "Error: cannot access camera"
                } else {
                    "Error: cannot open video"
                };
                log::error!("{message}: {e}");
                self.emit_error_frame(sink, message);
                return Err(StreamError::CameraOrStreamUnavailable {
                    message: message.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        logger.info(&format!(
            "Streaming {} ({}x{})",
            metadata.source, metadata.width, metadata.height
        ));
        let total = metadata.total_frames.unwrap_or(0);

        let mut frames = 0;
        let mut faces = 0;
        let mut stop = StopReason::Exhausted;
        for item in guard.source.frames() {
            if self.cancelled.load(Ordering::Relaxed) {
                stop = StopReason::Cancelled;
                break;
            }
            let mut frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("Frame read failed after {frames} frame(s): {e}");
                    stop = StopReason::ReadFailed(e.to_string());
                    break;
                }
            };
            let detections = match self.detect.process_frame(&mut frame, logger) {
                Ok(detections) => detections,
                Err(e @ PipelineError::InvalidImageInput(_)) => {
                    log::warn!("Ending stream on invalid frame {}: {e}", frame.index());
                    stop = StopReason::FrameRejected(e.to_string());
                    break;
                }
                Err(e) => {
                    log::error!("Ending stream, frame {} failed: {e}", frame.index());
                    stop = StopReason::FrameRejected(e.to_string());
                    break;
                }
            };
            faces += detections.len();
            frames += 1;
            logger.progress(frames, total);

            match sink.emit(&frame) {
                Ok(SinkStatus::Continue) => {}
                Ok(SinkStatus::Disconnected) => {
                    log::info!("Consumer disconnected after {frames} frame(s)");
                    stop = StopReason::Disconnected;
                    break;
                }
                Err(e) => {
                    if let Err(finish) = sink.finish() {
                        log::warn!("Cannot finish sink after emit failure: {finish}");
                    }
                    return Err(StreamError::Sink(e.to_string()));
                }
            }
        }

        sink.finish().map_err(|e| StreamError::Sink(e.to_string()))?;
        logger.summary();
        Ok(StreamSummary {
            frames,
            faces,
            stop,
        })
    }

    fn emit_error_frame(&self, sink: &mut dyn FrameSink, message: &str) {
        let mut frame = Frame::filled(ERROR_FRAME_WIDTH, ERROR_FRAME_HEIGHT, [0, 0, 0]);
        let annotator = self.detect.context().annotator();
        if let Err(e) = annotator.write_text(&mut frame, message, 20, 30, ERROR_TEXT_COLOR) {
            log::warn!("Cannot draw error frame text: {e}");
        }
        if let Err(e) = sink.emit(&frame).and_then(|_| sink.finish()) {
            log::warn!("Cannot deliver error frame: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::domain::model_loader::tests::ScriptedClassifier;
    use crate::pipeline::detect_masks_use_case::tests::{context, RecordingAnnotator};
    use crate::pipeline::pipeline_logger::{NullPipelineLogger, StagePipelineLogger};
    use crate::shared::face_box::FaceBox;
    use crate::shared::video_metadata::VideoMetadata;
    use std::sync::Mutex;

    struct StubSource {
        frames: Vec<Result<Frame, String>>,
        fail_open: bool,
        live: bool,
        closed: Arc<Mutex<usize>>,
    }

    impl StubSource {
        fn new(frames: Vec<Result<Frame, String>>) -> Self {
            Self {
                frames,
                fail_open: false,
                live: false,
                closed: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl FrameSource for StubSource {
        fn open(&mut self) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("device busy".into());
            }
            Ok(VideoMetadata {
                width: 64,
                height: 64,
                fps: 25.0,
                total_frames: Some(self.frames.len()),
                source: "stub".to_string(),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new(
                self.frames
                    .drain(..)
                    .map(|f| f.map_err(|e| -> Box<dyn std::error::Error> { e.into() })),
            )
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }

        fn is_live(&self) -> bool {
            self.live
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        frames: Vec<Frame>,
        disconnect_after: Option<usize>,
        fail_emit: bool,
        finished: bool,
    }

    impl FrameSink for CollectingSink {
        fn emit(&mut self, frame: &Frame) -> Result<SinkStatus, Box<dyn std::error::Error>> {
            if self.fail_emit {
                return Err("broken pipe".into());
            }
            self.frames.push(frame.clone());
            match self.disconnect_after {
                Some(n) if self.frames.len() >= n => Ok(SinkStatus::Disconnected),
                _ => Ok(SinkStatus::Continue),
            }
        }

        fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.finished = true;
            Ok(())
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0; 64 * 64 * 3], 64, 64, 3, index)
    }

    fn use_case(annotator: Arc<RecordingAnnotator>) -> StreamMasksUseCase {
        let ctx = context(
            vec![FaceBox::new(8, 8, 40, 40)],
            Some(Arc::new(ScriptedClassifier::new(vec![0.9, 0.1]))),
            annotator,
        );
        StreamMasksUseCase::new(DetectMasksUseCase::new(ctx), None)
    }

    #[test]
    fn test_processes_every_frame_in_order() {
        let mut source = StubSource::new((0..4).map(|i| Ok(frame(i))).collect());
        let closed = source.closed.clone();
        let mut sink = CollectingSink::default();
        let annotator = Arc::new(RecordingAnnotator::default());

        let summary = use_case(annotator.clone())
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap();

        assert_eq!(summary.frames, 4);
        assert_eq!(summary.faces, 4);
        assert_eq!(summary.stop, StopReason::Exhausted);
        let indices: Vec<usize> = sink.frames.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(sink.finished);
        assert_eq!(*closed.lock().unwrap(), 1);
        assert_eq!(annotator.drawn.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_open_failure_emits_error_frame() {
        let mut source = StubSource::new(Vec::new());
        source.fail_open = true;
        let closed = source.closed.clone();
        let mut sink = CollectingSink::default();
        let annotator = Arc::new(RecordingAnnotator::default());

        let err = use_case(annotator.clone())
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap_err();

        match err {
            StreamError::CameraOrStreamUnavailable { message, reason } => {
                assert_eq!(message, "Error: cannot open video");
                assert!(reason.contains("device busy"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.frames.len(), 1);
        assert_eq!((sink.frames[0].width(), sink.frames[0].height()), (640, 360));
        assert_eq!(
            *annotator.texts.lock().unwrap(),
            vec!["Error: cannot open video".to_string()]
        );
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_camera_open_failure_message() {
        let mut source = StubSource::new(Vec::new());
        source.fail_open = true;
        source.live = true;
        let annotator = Arc::new(RecordingAnnotator::default());
        let err = use_case(annotator.clone())
            .execute(&mut source, &mut CollectingSink::default(), &mut NullPipelineLogger)
            .unwrap_err();
        assert!(err.to_string().starts_with("Error: cannot access camera"));
    }

    #[test]
    fn test_invalid_frame_ends_stream_cleanly() {
        let broken = Frame::new(Vec::new(), 0, 0, 3, 1);
        let mut source = StubSource::new(vec![Ok(frame(0)), Ok(broken), Ok(frame(2))]);
        let closed = source.closed.clone();
        let mut sink = CollectingSink::default();

        let summary = use_case(Arc::new(RecordingAnnotator::default()))
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap();

        assert_eq!(summary.frames, 1);
        assert!(matches!(summary.stop, StopReason::FrameRejected(_)));
        assert_eq!(sink.frames.len(), 1);
        assert!(sink.finished);
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_read_failure_ends_stream_cleanly() {
        let mut source = StubSource::new(vec![Ok(frame(0)), Err("decoder error".to_string())]);
        let closed = source.closed.clone();
        let summary = use_case(Arc::new(RecordingAnnotator::default()))
            .execute(&mut source, &mut CollectingSink::default(), &mut NullPipelineLogger)
            .unwrap();
        assert_eq!(summary.stop, StopReason::ReadFailed("decoder error".to_string()));
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_sink_disconnect_stops_stream() {
        let mut source = StubSource::new((0..10).map(|i| Ok(frame(i))).collect());
        let mut sink = CollectingSink {
            disconnect_after: Some(3),
            ..CollectingSink::default()
        };
        let summary = use_case(Arc::new(RecordingAnnotator::default()))
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.stop, StopReason::Disconnected);
    }

    #[test]
    fn test_sink_failure_still_finishes_sink() {
        let mut source = StubSource::new((0..3).map(|i| Ok(frame(i))).collect());
        let closed = source.closed.clone();
        let mut sink = CollectingSink {
            fail_emit: true,
            ..CollectingSink::default()
        };
        let err = use_case(Arc::new(RecordingAnnotator::default()))
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap_err();
        match err {
            StreamError::Sink(reason) => assert!(reason.contains("broken pipe")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.finished);
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_cancellation_flag() {
        let mut source = StubSource::new((0..5).map(|i| Ok(frame(i))).collect());
        let stream = use_case(Arc::new(RecordingAnnotator::default()));
        stream.cancel_flag().store(true, Ordering::Relaxed);
        let mut sink = CollectingSink::default();
        let summary = stream
            .execute(&mut source, &mut sink, &mut NullPipelineLogger)
            .unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_progress_reported_to_logger() {
        let mut source = StubSource::new((0..3).map(|i| Ok(frame(i))).collect());
        let mut logger = StagePipelineLogger::new(1);
        use_case(Arc::new(RecordingAnnotator::default()))
            .execute(&mut source, &mut CollectingSink::default(), &mut logger)
            .unwrap();
        assert_eq!(logger.frames(), 3);
        assert_eq!(logger.stage("predict").unwrap().count, 3);
    }
}
