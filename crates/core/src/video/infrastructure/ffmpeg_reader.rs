use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

/// What an [`FfmpegReader`] decodes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamTarget {
    File(PathBuf),
    /// Capture device by index, e.g. `0` for the default webcam.
    Camera(u32),
}

impl StreamTarget {
    pub fn describe(&self) -> String {
        match self {
            StreamTarget::File(path) => path.display().to_string(),
            StreamTarget::Camera(index) => camera_url(*index).1,
        }
    }
}

struct OpenStream {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
}

/// Decodes video files and capture devices via ffmpeg-next.
///
/// Converts each decoded frame to BGR24 and wraps it in a [`Frame`].
pub struct FfmpegReader {
    target: StreamTarget,
    stream: Option<OpenStream>,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            stream: None,
        }
    }

    pub fn file(path: &Path) -> Self {
        Self::new(StreamTarget::File(path.to_path_buf()))
    }

    pub fn camera(index: u32) -> Self {
        Self::new(StreamTarget::Camera(index))
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl FrameSource for FfmpegReader {
    fn open(&mut self) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input = match &self.target {
            StreamTarget::File(path) => ffmpeg_next::format::input(path)
                .map_err(|e| format!("Cannot open video {}: {e}", path.display()))?,
            StreamTarget::Camera(index) => open_camera(*index)?,
        };

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = match (&self.target, stream.frames()) {
            (StreamTarget::File(_), n) if n > 0 => Some(n as usize),
            _ => None,
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames,
            source: self.target.describe(),
        };
        log::info!(
            "Opened {} ({}x{} @ {:.1} fps)",
            metadata.source,
            width,
            height,
            fps
        );

        self.stream = Some(OpenStream {
            input,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
        });
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(stream) = self.stream.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };
        Box::new(FfmpegFrameIter {
            stream,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Released {}", self.target.describe());
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.target, StreamTarget::Camera(_))
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lazy iterator that decodes one frame at a time.
struct FfmpegFrameIter<'a> {
    stream: &'a mut OpenStream,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.stream.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }
        let mut bgr_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.stream.scaler.run(&decoded, &mut bgr_frame) {
            return Some(Err(Box::new(e)));
        }
        let (width, height) = (self.stream.width, self.stream.height);
        let pixels = extract_packed_pixels(&bgr_frame, width, height);
        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.stream.input.packets().next() else {
                let _ = self.stream.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.stream.video_stream_index {
                continue;
            }

            if self.stream.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Platform capture backend and device URL for a camera index.
fn camera_url(index: u32) -> (&'static str, String) {
    if cfg!(target_os = "macos") {
        ("avfoundation", index.to_string())
    } else if cfg!(target_os = "windows") {
        ("vfwcap", index.to_string())
    } else {
        ("v4l2", format!("/dev/video{index}"))
    }
}

fn open_camera(index: u32) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
    ffmpeg_next::device::register_all();
    let (backend, url) = camera_url(index);
    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name().split(',').any(|name| name == backend))
        .ok_or_else(|| format!("Capture backend {backend} is not available"))?;
    let context = ffmpeg_next::format::open_with(
        &url,
        &ffmpeg_next::format::Format::Input(format),
        ffmpeg_next::Dictionary::new(),
    )
    .map_err(|e| format!("Cannot access camera {url}: {e}"))?;
    Ok(context.input())
}

/// Copies a packed 3-byte-per-pixel plane, dropping row padding.
fn extract_packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
