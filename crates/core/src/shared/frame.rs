use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("unsupported channel count {0}, expected 1 (gray) or 3 (BGR)")]
    Channels(u8),
    #[error("frame data holds {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// A single image/video frame: contiguous bytes in row-major order.
///
/// Three-channel frames are BGR. Single-channel frames are grayscale.
/// Conversion from decoder formats happens at I/O boundaries only.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Builds a frame from untrusted input, rejecting malformed buffers
    /// instead of asserting.
    pub fn try_new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        index: usize,
    ) -> Result<Self, FrameError> {
        let frame = Self {
            data,
            width,
            height,
            channels,
            index,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A solid BGR frame, used for diagnostic output.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, 3, 0)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(FrameError::Channels(self.channels));
        }
        let expected = self.pixel_count() * self.channels as usize;
        if self.data.len() != expected {
            return Err(FrameError::Length {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_gray(&self) -> bool {
        self.channels == 1
    }

    /// Luma plane using the ITU-R BT.601 weights on BGR input.
    pub fn to_gray(&self) -> Vec<u8> {
        if self.is_gray() {
            return self.data.clone();
        }
        self.data
            .chunks_exact(3)
            .map(|px| {
                let b = px[0] as f32;
                let g = px[1] as f32;
                let r = px[2] as f32;
                (0.114 * b + 0.587 * g + 0.299 * r).round().min(255.0) as u8
            })
            .collect()
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
