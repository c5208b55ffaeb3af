//! Image decoding through the `image` crate, and byte sources through `object_store`.

use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use object_store::{http::HttpBuilder, local::LocalFileSystem, path::Path, ObjectStore};
use tracing::{debug, instrument};

use coverage_common::{CatalogConfig, CatalogError, CatalogResult};

use crate::raster::{crop, AbortFlag, PixelBuffer, RasterDecoder, RasterImage, ReadParams};

/// Decodes PNG, TIFF and JPEG files.
///
/// These formats hold a single image, so only image index 0 is readable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRasterDecoder;

impl RasterDecoder for ImageRasterDecoder {
    fn decode(&self, bytes: &[u8], params: &ReadParams, abort: &AbortFlag) -> CatalogResult<RasterImage> {
        if params.image_index != 0 {
            return Err(CatalogError::Decode(format!(
                "image index {} requested from a single-image file",
                params.image_index
            )));
        }

        let image = image::load_from_memory(bytes).map_err(|e| CatalogError::Decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        if (width, height) != params.expected_size {
            return Err(CatalogError::Decode(format!(
                "image is {}x{} but the catalog declares {}x{}",
                width, height, params.expected_size.0, params.expected_size.1
            )));
        }

        let region = params.source_region;
        if region.x + region.width > width || region.y + region.height > height {
            return Err(CatalogError::Decode(format!(
                "region {:?} is outside the {}x{} image",
                region, width, height
            )));
        }

        let (bands, pixels) = split_samples(image);
        let aborted = || CatalogError::io("decode aborted");
        let pixels = match pixels {
            PixelBuffer::U8(data) => PixelBuffer::U8(crop(&data, width, bands, params, abort).ok_or_else(aborted)?),
            PixelBuffer::U16(data) => PixelBuffer::U16(crop(&data, width, bands, params, abort).ok_or_else(aborted)?),
            PixelBuffer::I16(data) => PixelBuffer::I16(crop(&data, width, bands, params, abort).ok_or_else(aborted)?),
            PixelBuffer::F32(data) => PixelBuffer::F32(crop(&data, width, bands, params, abort).ok_or_else(aborted)?),
        };

        let (out_w, out_h) = params.output_size();
        Ok(RasterImage::new(out_w, out_h, bands, pixels))
    }
}

/// Band count and raw samples of a decoded image, keeping its bit depth.
fn split_samples(image: DynamicImage) -> (u32, PixelBuffer) {
    match image {
        DynamicImage::ImageLuma8(buf) => (1, PixelBuffer::U8(buf.into_raw())),
        DynamicImage::ImageLumaA8(buf) => (2, PixelBuffer::U8(buf.into_raw())),
        DynamicImage::ImageRgb8(buf) => (3, PixelBuffer::U8(buf.into_raw())),
        DynamicImage::ImageRgba8(buf) => (4, PixelBuffer::U8(buf.into_raw())),
        DynamicImage::ImageLuma16(buf) => (1, PixelBuffer::U16(buf.into_raw())),
        DynamicImage::ImageLumaA16(buf) => (2, PixelBuffer::U16(buf.into_raw())),
        DynamicImage::ImageRgb16(buf) => (3, PixelBuffer::U16(buf.into_raw())),
        DynamicImage::ImageRgba16(buf) => (4, PixelBuffer::U16(buf.into_raw())),
        DynamicImage::ImageRgb32F(buf) => (3, PixelBuffer::F32(buf.into_raw())),
        DynamicImage::ImageRgba32F(buf) => (4, PixelBuffer::F32(buf.into_raw())),
        other => (4, PixelBuffer::U8(other.to_rgba8().into_raw())),
    }
}

/// Where image files are fetched from.
#[derive(Clone)]
pub struct RasterSources {
    store: Arc<dyn ObjectStore>,
    description: String,
}

impl RasterSources {
    pub fn new(store: Arc<dyn ObjectStore>, description: impl Into<String>) -> Self {
        Self {
            store,
            description: description.into(),
        }
    }

    /// Build from the root directory, or the root URL when no directory is set.
    pub fn from_config(config: &CatalogConfig) -> CatalogResult<Self> {
        config.require_source_root()?;
        if let Some(dir) = &config.root_directory {
            let store = LocalFileSystem::new_with_prefix(dir)
                .map_err(|e| CatalogError::Config(format!("invalid root directory '{}': {}", dir, e)))?;
            return Ok(Self::new(Arc::new(store), dir.clone()));
        }
        let url = config.root_url.clone().unwrap_or_default();
        let store = HttpBuilder::new()
            .with_url(url.clone())
            .build()
            .map_err(|e| CatalogError::Config(format!("invalid root URL '{}': {}", url, e)))?;
        Ok(Self::new(Arc::new(store), url))
    }

    /// Read a whole file.
    #[instrument(skip(self), fields(root = %self.description, path = %path))]
    pub async fn fetch(&self, path: &Path) -> CatalogResult<Bytes> {
        let result = self
            .store
            .get(path)
            .await
            .map_err(|e| CatalogError::io(format!("Failed to read {}: {}", path, e)))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| CatalogError::io(format!("Failed to read bytes of {}: {}", path, e)))?;
        debug!(size = bytes.len(), "Read image file");
        Ok(bytes)
    }
}

impl std::fmt::Debug for RasterSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSources").field("root", &self.description).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelRect;
    use image::{GrayImage, ImageFormat, Luma};
    use object_store::memory::InMemory;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = GrayImage::from_fn(width, height, |x, y| Luma([(y * width + x) as u8]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn params(region: PixelRect, subsampling: (u32, u32), expected: (u32, u32)) -> ReadParams {
        ReadParams {
            image_index: 0,
            source_region: region,
            subsampling,
            expected_size: expected,
        }
    }

    #[test]
    fn test_decode_region() {
        let bytes = png(8, 8);
        let image = ImageRasterDecoder
            .decode(&bytes, &params(PixelRect::new(2, 4, 4, 4), (2, 2), (8, 8)), &AbortFlag::new())
            .unwrap();
        assert_eq!((image.width, image.height, image.bands), (2, 2, 1));
        assert_eq!(image.sample(0, 0, 0), Some(34.0));
        assert_eq!(image.sample(1, 1, 0), Some(52.0));
    }

    #[test]
    fn test_size_mismatch() {
        let bytes = png(8, 8);
        let result = ImageRasterDecoder.decode(
            &bytes,
            &params(PixelRect::new(0, 0, 8, 8), (1, 1), (16, 16)),
            &AbortFlag::new(),
        );
        assert!(matches!(result, Err(CatalogError::Decode(_))));
    }

    #[test]
    fn test_aborted_decode_is_io_error() {
        let bytes = png(8, 8);
        let abort = AbortFlag::new();
        abort.abort();
        let result = ImageRasterDecoder.decode(&bytes, &params(PixelRect::new(0, 0, 8, 8), (1, 1), (8, 8)), &abort);
        assert!(matches!(result, Err(CatalogError::Io(_))));
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let store = Arc::new(InMemory::new());
        let sources = RasterSources::new(store.clone(), "memory");
        let path = Path::from("sst/a.png");
        assert!(matches!(sources.fetch(&path).await, Err(CatalogError::Io(_))));

        store.put(&path, Bytes::from(png(2, 2))).await.unwrap();
        assert!(!sources.fetch(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img.png"), png(4, 4)).unwrap();
        let config = CatalogConfig {
            root_directory: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        let sources = RasterSources::from_config(&config).unwrap();
        let bytes = sources.fetch(&Path::from("img.png")).await.unwrap();
        assert_eq!(bytes.len(), png(4, 4).len());
    }
}
