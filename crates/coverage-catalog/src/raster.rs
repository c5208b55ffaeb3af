//! Raw raster images and the decoder collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coverage_common::CatalogResult;

/// Element type of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    I16,
    F32,
}

impl SampleType {
    pub fn byte_width(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::F32 => 4,
        }
    }
}

/// Pixel samples, band-interleaved by pixel, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl PixelBuffer {
    pub fn sample_type(&self) -> SampleType {
        match self {
            PixelBuffer::U8(_) => SampleType::U8,
            PixelBuffer::U16(_) => SampleType::U16,
            PixelBuffer::I16(_) => SampleType::I16,
            PixelBuffer::F32(_) => SampleType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
            PixelBuffer::I16(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        match self {
            PixelBuffer::U8(v) => v.get(i).map(|&s| s as f64),
            PixelBuffer::U16(v) => v.get(i).map(|&s| s as f64),
            PixelBuffer::I16(v) => v.get(i).map(|&s| s as f64),
            PixelBuffer::F32(v) => v.get(i).map(|&s| s as f64),
        }
    }
}

/// A decoded image, before any geophysical interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub pixels: PixelBuffer,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, bands: u32, pixels: PixelBuffer) -> Self {
        Self {
            width,
            height,
            bands,
            pixels,
        }
    }

    /// Raw sample at column `x`, row `y`.
    pub fn sample(&self, x: u32, y: u32, band: u32) -> Option<f64> {
        if x >= self.width || y >= self.height || band >= self.bands {
            return None;
        }
        let i = ((y as usize * self.width as usize) + x as usize) * self.bands as usize + band as usize;
        self.pixels.get(i)
    }

    /// Pixel count × element width.
    pub fn byte_size(&self) -> usize {
        self.pixels.len() * self.pixels.sample_type().byte_width()
    }
}

/// A rectangle in pixel space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What to read from a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadParams {
    /// Image index inside the file.
    pub image_index: u32,
    /// Region of the source image to read.
    pub source_region: PixelRect,
    /// Keep one pixel every `subsampling` along each axis.
    pub subsampling: (u32, u32),
    /// Pixel size the catalog declares for the whole image.
    pub expected_size: (u32, u32),
}

impl ReadParams {
    /// Size of the image the decoder produces.
    pub fn output_size(&self) -> (u32, u32) {
        let (sx, sy) = (self.subsampling.0.max(1), self.subsampling.1.max(1));
        (
            self.source_region.width.div_ceil(sx),
            self.source_region.height.div_ceil(sy),
        )
    }
}

/// Cooperative cancellation signal shared with a running decode.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The raster decode collaborator.
///
/// Decoding is blocking; callers run it off the async executor. An
/// implementation should poll `abort` regularly and may return early with
/// an error once it is set.
pub trait RasterDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], params: &ReadParams, abort: &AbortFlag) -> CatalogResult<RasterImage>;
}

/// Copy the region described by `params` out of a full band-interleaved image.
pub(crate) fn crop<T: Copy>(
    data: &[T],
    width: u32,
    bands: u32,
    params: &ReadParams,
    abort: &AbortFlag,
) -> Option<Vec<T>> {
    let region = params.source_region;
    let (sx, sy) = (params.subsampling.0.max(1), params.subsampling.1.max(1));
    let (out_w, out_h) = params.output_size();
    let bands = bands as usize;
    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * bands);

    for row in 0..out_h {
        if abort.is_aborted() {
            return None;
        }
        let y = (region.y + row * sy) as usize;
        for col in 0..out_w {
            let x = (region.x + col * sx) as usize;
            let start = (y * width as usize + x) * bands;
            out.extend_from_slice(&data[start..start + bands]);
        }
    }
    Some(out)
}
