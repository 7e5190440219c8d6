use ndarray::{s, Array3, Array4, ArrayViewMut3};

use crate::shared::config::MaskConfig;
use crate::shared::constants::{TILE_CHANNELS, TILE_SIZE};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

use super::mask_classifier::TileConvention;

/// Extracts classifier tiles from face boxes.
///
/// Each box is grown by `margin` of its size on every side and clipped to the
/// frame, the region is resized bilinearly to 224x224 in RGB order, and the
/// classifier's numeric convention is applied. Degenerate boxes still yield a
/// tile: the crop is widened to at least one pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceNormalizer {
    margin: f64,
}

impl FaceNormalizer {
    pub fn new(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
        }
    }

    pub fn from_config(config: &MaskConfig) -> Self {
        Self::new(config.face_crop_margin)
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Region of `frame` actually sampled for `face`.
    pub fn crop_box(&self, frame: &Frame, face: &FaceBox) -> FaceBox {
        let (fw, fh) = (frame.width(), frame.height());
        let mut crop = face.expanded(self.margin, fw, fh);
        if crop.width == 0 {
            crop.x = crop.x.min(fw.saturating_sub(1));
            crop.width = 1;
        }
        if crop.height == 0 {
            crop.y = crop.y.min(fh.saturating_sub(1));
            crop.height = 1;
        }
        crop
    }

    pub fn normalize(&self, frame: &Frame, face: &FaceBox, convention: TileConvention) -> Array3<f32> {
        let mut tile = Array3::<f32>::zeros((TILE_SIZE, TILE_SIZE, TILE_CHANNELS));
        self.fill_tile(frame, face, convention, tile.view_mut());
        tile
    }

    /// Stacks one tile per face into an NHWC batch.
    pub fn normalize_batch(
        &self,
        frame: &Frame,
        faces: &[FaceBox],
        convention: TileConvention,
    ) -> Array4<f32> {
        let mut batch = Array4::<f32>::zeros((faces.len(), TILE_SIZE, TILE_SIZE, TILE_CHANNELS));
        for (i, face) in faces.iter().enumerate() {
            self.fill_tile(frame, face, convention, batch.slice_mut(s![i, .., .., ..]));
        }
        batch
    }

    fn fill_tile(
        &self,
        frame: &Frame,
        face: &FaceBox,
        convention: TileConvention,
        mut tile: ArrayViewMut3<'_, f32>,
    ) {
        let crop = self.crop_box(frame, face);
        let data = frame.data();
        let stride = frame.width() as usize;
        let channels = frame.channels() as usize;

        let xs = sample_axis(crop.x as usize, crop.width as usize);
        let ys = sample_axis(crop.y as usize, crop.height as usize);

        // BGR source, RGB tile. Gray sources replicate their single channel.
        let source_channel = |c: usize| if channels == 1 { 0 } else { 2 - c };
        let at = |y: usize, x: usize, c: usize| data[(y * stride + x) * channels + c] as f32;

        for (ty, &(y0, y1, wy)) in ys.iter().enumerate() {
            for (tx, &(x0, x1, wx)) in xs.iter().enumerate() {
                for c in 0..TILE_CHANNELS {
                    let sc = source_channel(c);
                    let top = lerp(at(y0, x0, sc), at(y0, x1, sc), wx);
                    let bottom = lerp(at(y1, x0, sc), at(y1, x1, sc), wx);
                    let value = lerp(top, bottom, wy);
                    tile[[ty, tx, c]] = convention.apply(value);
                }
            }
        }
    }
}

impl Default for FaceNormalizer {
    fn default() -> Self {
        Self::new(crate::shared::config::DEFAULT_FACE_CROP_MARGIN)
    }
}

/// Exact at both ends and for equal inputs.
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Bilinear taps along one axis: for each output index, the two source
/// indices and the weight of the second. Pixel centres are aligned.
fn sample_axis(offset: usize, len: usize) -> Vec<(usize, usize, f32)> {
    let scale = len as f32 / TILE_SIZE as f32;
    let last = len - 1;
    (0..TILE_SIZE)
        .map(|i| {
            let src = ((i as f32 + 0.5) * scale - 0.5).clamp(0.0, last as f32);
            let i0 = src.floor() as usize;
            let i1 = (i0 + 1).min(last);
            (offset + i0, offset + i1, src - i0 as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn uniform_frame(w: u32, h: u32, bgr: [u8; 3]) -> Frame {
        Frame::filled(w, h, bgr)
    }

    #[rstest]
    #[case::minimum_box(FaceBox::new(100, 100, 40, 40))]
    #[case::touching_edge(FaceBox::new(0, 0, 40, 40))]
    #[case::far_corner(FaceBox::new(600, 440, 40, 40))]
    #[case::large_box(FaceBox::new(10, 10, 500, 400))]
    #[case::zero_area(FaceBox::new(50, 50, 0, 0))]
    #[case::outside_frame(FaceBox::new(640, 480, 0, 0))]
    fn test_tile_is_always_224x224x3(#[case] face: FaceBox) {
        let frame = uniform_frame(640, 480, [0, 0, 0]);
        let tile = FaceNormalizer::default().normalize(&frame, &face, TileConvention::Raw);
        assert_eq!(tile.dim(), (224, 224, 3));
    }

    #[test]
    fn test_converts_bgr_to_rgb() {
        let frame = uniform_frame(64, 64, [10, 20, 30]);
        let tile =
            FaceNormalizer::new(0.0).normalize(&frame, &FaceBox::new(8, 8, 40, 40), TileConvention::Raw);
        assert_relative_eq!(tile[[0, 0, 0]], 30.0);
        assert_relative_eq!(tile[[100, 100, 1]], 20.0);
        assert_relative_eq!(tile[[223, 223, 2]], 10.0);
    }

    #[test]
    fn test_mobilenet_scaling() {
        let frame = uniform_frame(64, 64, [0, 255, 255]);
        let tile = FaceNormalizer::new(0.0).normalize(
            &frame,
            &FaceBox::new(0, 0, 64, 64),
            TileConvention::MobileNetV2,
        );
        assert_relative_eq!(tile[[5, 5, 0]], 1.0);
        assert_relative_eq!(tile[[5, 5, 2]], -1.0);
        assert!(tile.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_gray_frame_replicates_channel() {
        let frame = Frame::new(vec![90; 50 * 50], 50, 50, 1, 0);
        let tile = FaceNormalizer::default().normalize(&frame, &FaceBox::new(5, 5, 40, 40), TileConvention::Raw);
        assert_relative_eq!(tile[[10, 10, 0]], 90.0);
        assert_relative_eq!(tile[[10, 10, 1]], 90.0);
        assert_relative_eq!(tile[[10, 10, 2]], 90.0);
    }

    #[test]
    fn test_crop_box_applies_margin_and_clips() {
        let frame = uniform_frame(640, 480, [0, 0, 0]);
        let n = FaceNormalizer::new(0.15);
        assert_eq!(
            n.crop_box(&frame, &FaceBox::new(100, 100, 100, 100)),
            FaceBox::new(85, 85, 130, 130)
        );
        assert_eq!(
            n.crop_box(&frame, &FaceBox::new(0, 0, 40, 40)),
            FaceBox::new(0, 0, 46, 46)
        );
    }

    #[test]
    fn test_crop_box_widens_degenerate_box() {
        let frame = uniform_frame(10, 10, [0, 0, 0]);
        let crop = FaceNormalizer::new(0.15).crop_box(&frame, &FaceBox::new(10, 10, 0, 0));
        assert_eq!(crop, FaceBox::new(9, 9, 1, 1));
    }

    #[test]
    fn test_samples_only_the_crop() {
        // Left half blue, right half red (BGR)
        let mut data = Vec::new();
        for _y in 0..20 {
            for x in 0..40 {
                data.extend_from_slice(if x < 20 { &[255, 0, 0] } else { &[0, 0, 255] });
            }
        }
        let frame = Frame::new(data, 40, 20, 3, 0);
        let n = FaceNormalizer::new(0.0);
        let right = n.normalize(&frame, &FaceBox::new(20, 0, 20, 20), TileConvention::Raw);
        assert!(right.slice(s![.., .., 0]).iter().all(|&v| v == 255.0));
        assert!(right.slice(s![.., .., 2]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_batch_stacks_tiles_in_order() {
        let mut frame = uniform_frame(100, 50, [0, 0, 0]);
        // Right half white
        for y in 0..50usize {
            for x in 50..100usize {
                let i = (y * 100 + x) * 3;
                frame.data_mut()[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let faces = [FaceBox::new(0, 0, 40, 40), FaceBox::new(55, 5, 40, 40)];
        let batch = FaceNormalizer::new(0.0).normalize_batch(&frame, &faces, TileConvention::Raw);
        assert_eq!(batch.dim(), (2, 224, 224, 3));
        assert_relative_eq!(batch[[0, 112, 112, 0]], 0.0);
        assert_relative_eq!(batch[[1, 112, 112, 0]], 255.0);
    }

    #[test]
    fn test_empty_batch() {
        let frame = uniform_frame(10, 10, [0, 0, 0]);
        let batch = FaceNormalizer::default().normalize_batch(&frame, &[], TileConvention::Raw);
        assert_eq!(batch.dim(), (0, 224, 224, 3));
    }

    #[test]
    fn test_negative_margin_is_clamped() {
        assert_relative_eq!(FaceNormalizer::new(-0.3).margin(), 0.0);
    }
}
