//! Colour filters as pure frame transforms.
//!
//! Every [`VisualFilter`] is a 3x3 colour matrix. The same matrix is applied
//! in-process to decoded frames and rendered as an FFmpeg `colorchannelmixer`
//! for the encode, so both paths produce the same colours.

use image::RgbImage;
use rayon::prelude::*;

use vedit_models::VisualFilter;

/// A decoded RGB frame.
pub type Frame = RgbImage;

/// Row-major 3x3 matrix mapping (R, G, B) to (R', G', B').
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [[f32; 3]; 3]);

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Luminance replicated to every channel.
    pub const GRAYSCALE: ColorMatrix = ColorMatrix([
        [0.299, 0.587, 0.114],
        [0.299, 0.587, 0.114],
        [0.299, 0.587, 0.114],
    ]);

    pub const SEPIA: ColorMatrix = ColorMatrix([
        [0.272, 0.534, 0.131],
        [0.349, 0.686, 0.168],
        [0.393, 0.769, 0.189],
    ]);

    /// Warm cast: red scaled down, blue scaled up.
    pub const VINTAGE: ColorMatrix = ColorMatrix([[0.8, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.1]]);

    pub fn for_filter(filter: VisualFilter) -> ColorMatrix {
        match filter {
            VisualFilter::None => Self::IDENTITY,
            VisualFilter::BlackAndWhite => Self::GRAYSCALE,
            VisualFilter::Sepia => Self::SEPIA,
            VisualFilter::Vintage => Self::VINTAGE,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Map one pixel, clamping each channel to [0, 255].
    pub fn apply_pixel(&self, px: [u8; 3]) -> [u8; 3] {
        let [r, g, b] = px.map(f32::from);
        self.0.map(|row| (row[0] * r + row[1] * g + row[2] * b).round().clamp(0.0, 255.0) as u8)
    }

    /// Matrix product `other * self`: apply `self` first, then `other`.
    pub fn then(&self, other: &ColorMatrix) -> ColorMatrix {
        let mut out = [[0.0f32; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| other.0[i][k] * self.0[k][j]).sum();
            }
        }
        ColorMatrix(out)
    }

    /// Equivalent FFmpeg filter. Output is clipped to the channel range like `apply_pixel`.
    pub fn to_ffmpeg_filter(&self) -> String {
        let m = &self.0;
        format!(
            "colorchannelmixer=rr={}:rg={}:rb={}:gr={}:gg={}:gb={}:br={}:bg={}:bb={}",
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
        )
    }
}

/// A pure frame transform.
pub fn apply_matrix(matrix: &ColorMatrix, mut frame: Frame) -> Frame {
    if matrix.is_identity() {
        return frame;
    }
    let raw: &mut [u8] = &mut frame;
    raw.par_chunks_exact_mut(3).for_each(|px| {
        let out = matrix.apply_pixel([px[0], px[1], px[2]]);
        px.copy_from_slice(&out);
    });
    frame
}

/// An ordered composition of colour matrices.
///
/// The stages are kept separately for per-frame use so every stage clamps like
/// the standalone filter would.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePipeline {
    stages: Vec<ColorMatrix>,
}

impl FramePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline for a directive filter (empty for `none`).
    pub fn for_filter(filter: VisualFilter) -> Self {
        Self::new().then(ColorMatrix::for_filter(filter))
    }

    pub fn then(mut self, matrix: ColorMatrix) -> Self {
        if !matrix.is_identity() {
            self.stages.push(matrix);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over the frame.
    pub fn apply(&self, frame: Frame) -> Frame {
        self.stages
            .iter()
            .fold(frame, |frame, matrix| apply_matrix(matrix, frame))
    }

    /// FFmpeg filter chain, one mixer per stage; `None` when empty.
    pub fn to_ffmpeg_filter(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        Some(
            self.stages
                .iter()
                .map(ColorMatrix::to_ffmpeg_filter)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(px: [u8; 3]) -> Frame {
        RgbImage::from_pixel(3, 2, Rgb(px))
    }

    #[test]
    fn test_grayscale_luminance() {
        let out = FramePipeline::for_filter(VisualFilter::BlackAndWhite).apply(frame([200, 100, 50]));
        // 0.299*200 + 0.587*100 + 0.114*50 = 124.2
        assert!(out.pixels().all(|p| p.0 == [124, 124, 124]));
    }

    #[test]
    fn test_sepia_clamps_to_channel_range() {
        let out = apply_matrix(&ColorMatrix::SEPIA, frame([255, 255, 255]));
        // Row sums are 0.937, 1.203, 1.351
        assert_eq!(out.get_pixel(0, 0).0, [239, 255, 255]);
    }

    #[test]
    fn test_vintage_scales_red_and_blue() {
        let out = FramePipeline::for_filter(VisualFilter::Vintage).apply(frame([100, 100, 240]));
        assert_eq!(out.get_pixel(1, 1).0, [80, 100, 255]);
    }

    #[test]
    fn test_none_is_noop() {
        let pipeline = FramePipeline::for_filter(VisualFilter::None);
        assert!(pipeline.is_empty());
        assert!(pipeline.to_ffmpeg_filter().is_none());
        let input = frame([1, 2, 3]);
        assert_eq!(pipeline.apply(input.clone()), input);
    }

    #[test]
    fn test_pipeline_composes_in_order() {
        let pipeline = FramePipeline::new()
            .then(ColorMatrix::VINTAGE)
            .then(ColorMatrix::GRAYSCALE);
        let out = pipeline.apply(frame([100, 100, 100]));
        // vintage -> (80, 100, 110); grey = 23.92 + 58.7 + 12.54 = 95.16
        assert_eq!(out.get_pixel(0, 0).0, [95, 95, 95]);

        let combined = ColorMatrix::VINTAGE.then(&ColorMatrix::GRAYSCALE);
        assert_eq!(combined.apply_pixel([100, 100, 100]), [95, 95, 95]);
    }

    #[test]
    fn test_ffmpeg_mixer_matches_matrix() {
        let filter = FramePipeline::for_filter(VisualFilter::Sepia)
            .to_ffmpeg_filter()
            .unwrap();
        assert_eq!(
            filter,
            "colorchannelmixer=rr=0.272:rg=0.534:rb=0.131:gr=0.349:gg=0.686:gb=0.168:br=0.393:bg=0.769:bb=0.189"
        );
    }
}
