use serde::Serialize;

/// Axis-aligned face bounding box in pixel coordinates.
///
/// Boxes produced by the locator are always clipped to their source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from possibly negative or oversized detector output,
    /// clipped to `[0, frame_w) x [0, frame_h)`.
    pub fn from_signed(x: i64, y: i64, width: i64, height: i64, frame_w: u32, frame_h: u32) -> Self {
        let x0 = x.clamp(0, frame_w as i64);
        let y0 = y.clamp(0, frame_h as i64);
        let x1 = (x + width.max(0)).clamp(0, frame_w as i64);
        let y1 = (y + height.max(0)).clamp(0, frame_h as i64);
        Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn clipped(&self, frame_w: u32, frame_h: u32) -> Self {
        Self::from_signed(
            self.x as i64,
            self.y as i64,
            self.width as i64,
            self.height as i64,
            frame_w,
            frame_h,
        )
    }

    /// Grows the box by `margin` of its width/height on every side, then
    /// clips to the frame. Margin offsets truncate toward zero.
    pub fn expanded(&self, margin: f64, frame_w: u32, frame_h: u32) -> Self {
        let mx = (margin.max(0.0) * self.width as f64) as i64;
        let my = (margin.max(0.0) * self.height as f64) as i64;
        Self::from_signed(
            self.x as i64 - mx,
            self.y as i64 - my,
            self.width as i64 + 2 * mx,
            self.height as i64 + 2 * my,
            frame_w,
            frame_h,
        )
    }

    /// Maps a box found on a resized copy back to the source resolution.
    pub fn scaled(&self, factor: f64, frame_w: u32, frame_h: u32) -> Self {
        Self::from_signed(
            (self.x as f64 * factor).round() as i64,
            (self.y as f64 * factor).round() as i64,
            (self.width as f64 * factor).round() as i64,
            (self.height as f64 * factor).round() as i64,
            frame_w,
            frame_h,
        )
    }
}
