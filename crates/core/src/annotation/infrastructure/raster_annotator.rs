use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{ImageBuffer, Luma, Rgb};
use imageproc::definitions::Clamp;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size, Canvas};
use imageproc::rect::Rect;

use crate::annotation::domain::frame_annotator::{Annotation, Bgr, FrameAnnotator};
use crate::shared::config::MaskConfig;
use crate::shared::frame::Frame;

const EMBEDDED_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");
const BOX_THICKNESS: u32 = 2;
const LABEL_FONT_SIZE: f32 = 20.0;
/// Gap between the caption and the top edge of its box.
const LABEL_OFFSET: i32 = 4;

/// Draws boxes and captions with `imageproc`, directly on the frame bytes.
///
/// BGR frames are viewed as three-byte pixels with colors given in the same
/// byte order, so no channel swap is needed. Grayscale frames receive the
/// luma of each color. Captions use DejaVu Sans unless another font is
/// configured.
pub struct RasterAnnotator {
    font: FontArc,
    scale: PxScale,
}

impl RasterAnnotator {
    pub fn new(font: FontArc) -> Self {
        Self {
            font,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }

    pub fn embedded() -> Result<Self, Box<dyn std::error::Error>> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT)
            .map_err(|e| format!("Invalid embedded label font: {e}"))?;
        Ok(Self::new(font))
    }

    pub fn from_font_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("Cannot read label font {}: {e}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| format!("Invalid label font {}: {e}", path.display()))?;
        log::info!("Loaded label font {}", path.display());
        Ok(Self::new(font))
    }

    /// Uses the configured font when it loads, the embedded one otherwise.
    pub fn from_config(config: &MaskConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = &config.label_font {
            match Self::from_font_file(path) {
                Ok(annotator) => return Ok(annotator),
                Err(e) => log::warn!("{e}; falling back to the embedded font"),
            }
        }
        Self::embedded()
    }

    fn paint<C>(&self, canvas: &mut C, annotations: &[Annotation], pixel: impl Fn(Bgr) -> C::Pixel)
    where
        C: Canvas,
        <C::Pixel as image::Pixel>::Subpixel: Into<f32> + Clamp<f32>,
    {
        for annotation in annotations {
            let face = annotation.face;
            let color = pixel(annotation.color);
            for inset in 0..BOX_THICKNESS {
                let (w, h) = (
                    face.width.saturating_sub(2 * inset),
                    face.height.saturating_sub(2 * inset),
                );
                if w == 0 || h == 0 {
                    break;
                }
                let rect = Rect::at((face.x + inset) as i32, (face.y + inset) as i32).of_size(w, h);
                draw_hollow_rect_mut(canvas, rect, color);
            }

            if !annotation.caption.is_empty() {
                let (_, text_h) = text_size(self.scale, &self.font, &annotation.caption);
                let y = (face.y as i32 - LABEL_OFFSET - text_h as i32).max(0);
                draw_text_mut(
                    canvas,
                    color,
                    face.x as i32,
                    y,
                    self.scale,
                    &self.font,
                    &annotation.caption,
                );
            }
        }
    }
}

impl FrameAnnotator for RasterAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        annotations: &[Annotation],
    ) -> Result<(), Box<dyn std::error::Error>> {
        frame.validate()?;
        let (w, h) = (frame.width(), frame.height());
        // Boxes arriving here are already clipped; clip again for callers
        // that build annotations by hand.
        let clipped: Vec<Annotation> = annotations
            .iter()
            .map(|a| Annotation {
                face: a.face.clipped(w, h),
                ..a.clone()
            })
            .collect();

        if frame.is_gray() {
            let mut canvas = ImageBuffer::<Luma<u8>, &mut [u8]>::from_raw(w, h, frame.data_mut())
                .ok_or("Frame buffer does not match its dimensions")?;
            self.paint(&mut canvas, &clipped, |c| Luma([luma(c)]));
        } else {
            let mut canvas = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(w, h, frame.data_mut())
                .ok_or("Frame buffer does not match its dimensions")?;
            self.paint(&mut canvas, &clipped, Rgb);
        }
        Ok(())
    }

    fn write_text(
        &self,
        frame: &mut Frame,
        text: &str,
        x: i32,
        y: i32,
        color: Bgr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        frame.validate()?;
        let (w, h) = (frame.width(), frame.height());
        if frame.is_gray() {
            let mut canvas = ImageBuffer::<Luma<u8>, &mut [u8]>::from_raw(w, h, frame.data_mut())
                .ok_or("Frame buffer does not match its dimensions")?;
            draw_text_mut(&mut canvas, Luma([luma(color)]), x, y, self.scale, &self.font, text);
        } else {
            let mut canvas = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(w, h, frame.data_mut())
                .ok_or("Frame buffer does not match its dimensions")?;
            draw_text_mut(&mut canvas, Rgb(color), x, y, self.scale, &self.font, text);
        }
        Ok(())
    }
}

/// BT.601 luma of a BGR color.
fn luma(color: Bgr) -> u8 {
    let [b, g, r] = color.map(f32::from);
    (0.114 * b + 0.587 * g + 0.299 * r).round().min(255.0) as u8
}
