//! Test data generators for synthetic images.
//!
//! These generators create predictable, verifiable sample patterns that
//! the image decoder reads back.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma, RgbImage, Rgb};

/// Creates an 8-bit sample grid with predictable values.
///
/// Each sample is `(col + row) % 255 + 1`, so no sample is 0 ("no data").
///
/// # Example
///
/// ```
/// use test_utils::create_sample_grid;
///
/// let grid = create_sample_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[0], 1);   // col=0, row=0
/// assert_eq!(grid[1], 2);   // col=1, row=0
/// assert_eq!(grid[10], 2);  // col=0, row=1
/// ```
pub fn create_sample_grid(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            data.push(sample_at(col, row));
        }
    }
    data
}

/// The sample `create_sample_grid` puts at a pixel.
pub fn sample_at(col: u32, row: u32) -> u8 {
    ((col + row) % 255 + 1) as u8
}

/// Encodes a grayscale PNG of `create_sample_grid(width, height)`.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode_gray(GrayImage::from_fn(width, height, |x, y| Luma([sample_at(x, y)])))
}

/// Encodes a grayscale PNG holding one sample everywhere.
pub fn constant_png(width: u32, height: u32, sample: u8) -> Vec<u8> {
    encode_gray(GrayImage::from_pixel(width, height, Luma([sample])))
}

/// Encodes a grayscale PNG whose left half is "no data" (0) and right
/// half is `sample`.
pub fn half_nodata_png(width: u32, height: u32, sample: u8) -> Vec<u8> {
    encode_gray(GrayImage::from_fn(width, height, |x, _| {
        Luma([if x < width / 2 { 0 } else { sample }])
    }))
}

/// Encodes an RGB PNG, for tests expecting three bands.
pub fn rgb_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    bytes.into_inner()
}

fn encode_gray(image: GrayImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    bytes.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_grid_has_no_nodata() {
        let grid = create_sample_grid(300, 300);
        assert!(grid.iter().all(|&s| s > 0));
    }

    #[test]
    fn test_png_decodes_back() {
        let bytes = gradient_png(8, 4);
        let image = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (8, 4));
        assert_eq!(image.get_pixel(3, 2).0[0], sample_at(3, 2));
    }

    #[test]
    fn test_half_nodata() {
        let bytes = half_nodata_png(4, 1, 9);
        let image = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(image.into_raw(), vec![0, 0, 9, 9]);
    }
}
