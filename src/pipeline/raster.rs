//! Page rasters as delivered by the renderer, and their normalisation to RGB.
//!
//! The split heuristic works on 3-channel colour images. Renderers hand out
//! grey, grey+alpha, RGB or RGBA buffers; grey is widened to RGB, alpha is
//! dropped, and any other colour-channel count aborts the document with
//! [`PrepError::UnsupportedChannels`] instead of being guessed at.

use crate::error::PrepError;
use image::{DynamicImage, RgbImage};

/// An interleaved 8-bit pixel buffer for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRaster {
    pub width: u32,
    pub height: u32,
    /// Samples per pixel, alpha included.
    pub channels: u8,
    /// Whether the last sample of each pixel is alpha.
    pub has_alpha: bool,
    pub samples: Vec<u8>,
}

impl PageRaster {
    pub fn new(width: u32, height: u32, channels: u8, has_alpha: bool, samples: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            has_alpha,
            samples,
        }
    }

    /// Number of colour channels, alpha excluded.
    pub fn colour_channels(&self) -> u8 {
        self.channels.saturating_sub(u8::from(self.has_alpha))
    }

    /// Normalise to an RGB image.
    ///
    /// `page` is the 1-indexed page number used in the error.
    pub fn to_rgb(&self, page: usize) -> Result<RgbImage, PrepError> {
        let colour = self.colour_channels();
        if colour != 3 && colour != 1 {
            return Err(PrepError::UnsupportedChannels {
                page,
                channels: colour,
            });
        }

        let stride = usize::from(self.channels);
        let expected = self.width as usize * self.height as usize * stride;
        if self.samples.len() < expected {
            return Err(PrepError::RasterisationFailed {
                page,
                detail: format!(
                    "pixel buffer holds {} bytes, expected {expected}",
                    self.samples.len()
                ),
            });
        }

        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.samples[..expected].chunks_exact(stride) {
            if colour == 3 {
                rgb.extend_from_slice(&px[..3]);
            } else {
                rgb.extend_from_slice(&[px[0], px[0], px[0]]);
            }
        }

        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
            PrepError::Internal(format!("page {page}: RGB buffer size mismatch"))
        })
    }
}

impl From<DynamicImage> for PageRaster {
    fn from(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(buf) => Self::new(width, height, 1, false, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => Self::new(width, height, 2, true, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => Self::new(width, height, 3, false, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => Self::new(width, height, 4, true, buf.into_raw()),
            // Wider sample types are narrowed to 8-bit RGBA first.
            other => Self::new(width, height, 4, true, other.into_rgba8().into_raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn rgba_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0])));
        let raster = PageRaster::from(img);
        assert_eq!(raster.colour_channels(), 3);
        let rgb = raster.to_rgb(1).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn grey_is_widened_to_rgb() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 1, Luma([77])));
        let rgb = PageRaster::from(img).to_rgb(1).unwrap();
        assert_eq!(rgb.dimensions(), (3, 1));
        assert_eq!(rgb.get_pixel(2, 0).0, [77, 77, 77]);
    }

    #[test]
    fn grey_alpha_is_widened_to_rgb() {
        let raster = PageRaster::new(1, 1, 2, true, vec![200, 255]);
        assert_eq!(raster.to_rgb(1).unwrap().get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn two_colour_channels_are_rejected() {
        let raster = PageRaster::new(1, 1, 2, false, vec![1, 2]);
        let err = raster.to_rgb(5).unwrap_err();
        assert!(matches!(
            err,
            PrepError::UnsupportedChannels {
                page: 5,
                channels: 2
            }
        ));
    }

    #[test]
    fn cmyk_like_buffers_are_rejected() {
        let raster = PageRaster::new(1, 1, 4, false, vec![0, 0, 0, 0]);
        assert!(matches!(
            raster.to_rgb(1),
            Err(PrepError::UnsupportedChannels { channels: 4, .. })
        ));
    }

    #[test]
    fn short_buffer_is_an_error() {
        let raster = PageRaster::new(4, 4, 3, false, vec![0; 5]);
        assert!(matches!(
            raster.to_rgb(1),
            Err(PrepError::RasterisationFailed { .. })
        ));
    }
}
