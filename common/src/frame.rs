use image::Rgb32FImage;
use ndarray::{Array4, ArrayView4};

use crate::config::ChannelOrder;

/// One decoded frame as a `(batch, channel, height, width)` array.
///
/// The batch axis is always 1; it keeps the per-frame metric shaped like a
/// batched one. Samples are normalized to `[0.0, 1.0]` and channels are in
/// red-green-blue order.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Array4<f32>,
}

impl Frame {
    /// Wrap an existing `(1, C, H, W)` array. The layout is kept as given,
    /// which may be non-contiguous.
    pub fn from_array(pixels: Array4<f32>) -> Self {
        Self { pixels }
    }

    /// Build a channel-first frame from an interleaved normalized RGB image.
    ///
    /// `order` names the channel order the source file was written in; a
    /// `Bgr` source has its first and last planes swapped.
    pub fn from_rgb32f(image: &Rgb32FImage, order: ChannelOrder) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let channel = match order {
                    ChannelOrder::Rgb => c,
                    ChannelOrder::Bgr => 2 - c,
                };
                image.get_pixel(x as u32, y as u32).0[channel]
            },
        );
        Self { pixels }
    }

    pub fn pixels(&self) -> ArrayView4<'_, f32> {
        self.pixels.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.pixels.shape()
    }

    pub fn channels(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[2]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[3]
    }
}

/// Frames decoded from one directory, index-aligned with their file names.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    names: Vec<String>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: String, frame: Frame) {
        self.names.push(name);
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Frame)> {
        self.names.iter().map(String::as_str).zip(self.frames.iter())
    }
}
