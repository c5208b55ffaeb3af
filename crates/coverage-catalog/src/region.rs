//! Pixel region and sub-sampling computation.

use coverage_common::BoundingBox;

use crate::raster::PixelRect;

/// What to read from one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegion {
    pub clip: PixelRect,
    pub subsampling: (u32, u32),
}

/// Inputs of `compute_region`, all spatial values in the coverage CRS
/// except resolutions, which are in table units per pixel.
#[derive(Debug, Clone, Copy)]
pub struct RegionRequest {
    /// Extent of the whole image.
    pub image_extent: BoundingBox,
    /// Pixel size of the whole image.
    pub image_size: (u32, u32),
    /// Area of interest.
    pub area: BoundingBox,
    /// Native cell size of the image.
    pub native_resolution: (f64, f64),
    /// Desired cell size, if any.
    pub desired_resolution: Option<(f64, f64)>,
    /// Smallest number of pixels to read along either axis.
    pub min_tile_size: u32,
    /// Relative tolerance on resolution ratios.
    pub epsilon: f64,
}

/// Compute the clip rectangle and sub-sampling of a read.
///
/// Returns `None` when the area does not meet the image. An area that only
/// touches it (a point or a line) still yields a region.
pub fn compute_region(request: &RegionRequest) -> Option<ReadRegion> {
    let extent = request.image_extent;
    let (width, height) = request.image_size;
    if width == 0 || height == 0 || extent.is_empty() || extent.area() <= 0.0 {
        return None;
    }
    let overlap = extent.intersection(&request.area)?;

    let subsampling = match request.desired_resolution {
        Some((rx, ry)) => (
            stride(rx, request.native_resolution.0, width, request.min_tile_size, request.epsilon),
            stride(ry, request.native_resolution.1, height, request.min_tile_size, request.epsilon),
        ),
        None => (1, 1),
    };

    // Rows run from the top of the extent downwards.
    let scale_x = width as f64 / extent.width();
    let scale_y = height as f64 / extent.height();
    let x0 = ((overlap.min_x - extent.min_x) * scale_x).floor();
    let x1 = ((overlap.max_x - extent.min_x) * scale_x).ceil();
    let y0 = ((extent.max_y - overlap.max_y) * scale_y).floor();
    let y1 = ((extent.max_y - overlap.min_y) * scale_y).ceil();

    let (x, w) = fit_axis(x0, x1, width, subsampling.0, request.min_tile_size);
    let (y, h) = fit_axis(y0, y1, height, subsampling.1, request.min_tile_size);

    Some(ReadRegion {
        clip: PixelRect::new(x, y, w, h),
        subsampling,
    })
}

/// Sampling stride turning a native cell size into the desired one, kept
/// large enough that at least `min_tile` pixels remain.
fn stride(desired: f64, native: f64, size: u32, min_tile: u32, epsilon: f64) -> u32 {
    let max = (size / min_tile.max(1)).max(1);
    if !(desired > 0.0 && native > 0.0) {
        return 1;
    }
    let ratio = (desired / native) * (1.0 + epsilon);
    (ratio.floor().max(1.0) as u32).clamp(1, max)
}

/// Snap `[lo, hi)` to a multiple of `step`, grow it symmetrically to
/// `min_tile * step` pixels, then clamp it inside `[0, size)`.
fn fit_axis(lo: f64, hi: f64, size: u32, step: u32, min_tile: u32) -> (u32, u32) {
    let size_f = size as f64;
    let lo = lo.clamp(0.0, size_f);
    let hi = hi.clamp(lo, size_f);
    let step = step.max(1) as f64;

    let mut length = ((hi - lo) / step).ceil() * step;
    let minimum = (min_tile as f64 * step).min(size_f);
    let mut start = lo;
    if length < minimum {
        start -= ((minimum - length) / 2.0).floor();
        length = minimum;
    }
    let length = length.min(size_f);
    let start = start.clamp(0.0, size_f - length);
    (start as u32, length as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(area: BoundingBox, desired: Option<(f64, f64)>) -> RegionRequest {
        RegionRequest {
            image_extent: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            image_size: (1000, 1000),
            area,
            native_resolution: (0.01, 0.01),
            desired_resolution: desired,
            min_tile_size: 64,
            epsilon: 1e-6,
        }
    }

    #[test]
    fn test_disjoint_area() {
        let req = request(BoundingBox::new(20.0, 20.0, 30.0, 30.0), None);
        assert_eq!(compute_region(&req), None);
    }

    #[test]
    fn test_full_image() {
        let req = request(BoundingBox::new(-5.0, -5.0, 15.0, 15.0), None);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip, PixelRect::new(0, 0, 1000, 1000));
        assert_eq!(region.subsampling, (1, 1));
    }

    #[test]
    fn test_rows_are_flipped() {
        // Top-left quarter of the extent.
        let req = request(BoundingBox::new(0.0, 5.0, 5.0, 10.0), None);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip, PixelRect::new(0, 0, 500, 500));
    }

    #[test]
    fn test_subsampling_and_snapping() {
        let req = request(BoundingBox::new(0.0, 0.0, 5.0, 5.0), Some((0.03, 0.05)));
        let region = compute_region(&req).unwrap();
        assert_eq!(region.subsampling, (3, 5));
        // 500 columns round up to 501, a multiple of 3.
        assert_eq!(region.clip, PixelRect::new(0, 500, 501, 500));
    }

    #[test]
    fn test_subsampling_is_clamped() {
        // 1000 / 64 = 15 at most.
        let req = request(BoundingBox::new(0.0, 0.0, 10.0, 10.0), Some((1.0, 0.001)));
        let region = compute_region(&req).unwrap();
        assert_eq!(region.subsampling, (15, 1));
    }

    #[test]
    fn test_point_query_grows_to_min_tile() {
        let req = request(BoundingBox::new(5.0, 5.0, 5.0, 5.0), None);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip.width, 64);
        assert_eq!(region.clip.height, 64);
        assert_eq!(region.clip.x, 500 - 32);
    }

    #[test]
    fn test_growth_is_clamped_to_image() {
        let req = request(BoundingBox::new(0.0, 9.99, 0.01, 10.0), None);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip, PixelRect::new(0, 0, 64, 64));

        let req = request(BoundingBox::new(9.99, 0.0, 10.0, 0.01), None);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip, PixelRect::new(936, 936, 64, 64));
    }

    #[test]
    fn test_small_image_reads_whole() {
        let mut req = request(BoundingBox::new(4.0, 4.0, 5.0, 5.0), None);
        req.image_size = (32, 16);
        let region = compute_region(&req).unwrap();
        assert_eq!(region.clip, PixelRect::new(0, 0, 32, 16));
    }
}
