//! Gutter detection: decide whether a scanned page holds two half-pages.
//!
//! Two-up scans (a book spread photographed as one image) have a seam down
//! the middle. The heuristic looks for it twice:
//!
//! 1. **Edge density** of a narrow luminance strip centred on the page. Text
//!    running across the centre produces many Canny edges; a gutter produces
//!    almost none.
//! 2. **Colour spread** of a band just right of centre in the colour image.
//!    A near-uniform band is margin paper, not content.
//!
//! Either signal alone is enough to split. Strip bounds are clamped to the
//! image, so pages narrower than the strips never panic; an empty strip
//! carries no evidence and does not trigger a split.
//!
//! The edge map is Canny without the usual Gaussian pre-smoothing: 3×3
//! Sobel gradients, L1 magnitude, non-maximum suppression and hysteresis.
//! At the default 72 DPI analysis scale text strokes are about one pixel
//! wide, and a blur would flatten them below the thresholds.

use crate::config::SplitHeuristics;
use image::{imageops, GrayImage, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};

/// Which signal decided the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitReason {
    /// Few edges in the centre strip.
    SparseEdges,
    /// Near-uniform colour band right of centre.
    UniformBand,
    /// Neither signal fired.
    Continuous,
}

/// Outcome of [`analyze_page`], with the measurements behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitVerdict {
    pub split: bool,
    pub reason: SplitReason,
    /// Mean edge-map value of the centre strip (0–255 scale), if non-empty.
    pub edge_density: Option<f64>,
    /// Max − min channel value of the colour band, if it was inspected.
    pub band_range: Option<u8>,
}

/// Decide whether `image` should be split into left and right halves.
pub fn decide(image: &RgbImage, heuristics: &SplitHeuristics) -> bool {
    analyze_page(image, heuristics).split
}

/// Run the gutter heuristic and report how the decision was reached.
pub fn analyze_page(image: &RgbImage, heuristics: &SplitHeuristics) -> SplitVerdict {
    let (width, height) = image.dimensions();
    let centre = width / 2;

    let gray = imageops::grayscale(image);
    let strip_x0 = centre.saturating_sub(heuristics.strip_half_width);
    let strip_x1 = centre
        .saturating_add(heuristics.strip_half_width)
        .min(width);
    let edge_density = edge_density(&gray, strip_x0, strip_x1, height, heuristics);

    if let Some(density) = edge_density {
        if density < heuristics.edge_density_threshold {
            return SplitVerdict {
                split: true,
                reason: SplitReason::SparseEdges,
                edge_density,
                band_range: None,
            };
        }
    }

    let band_x0 = centre.saturating_add(heuristics.band_start_offset).min(width);
    let band_x1 = centre.saturating_add(heuristics.band_end_offset).min(width);
    let band_range = channel_range(image, band_x0, band_x1, height);

    match band_range {
        Some(range) if range < heuristics.uniform_range_threshold => SplitVerdict {
            split: true,
            reason: SplitReason::UniformBand,
            edge_density,
            band_range,
        },
        _ => SplitVerdict {
            split: false,
            reason: SplitReason::Continuous,
            edge_density,
            band_range,
        },
    }
}

/// Mean edge-map value over the columns `x0..x1`; `None` for an empty strip.
fn edge_density(
    gray: &GrayImage,
    x0: u32,
    x1: u32,
    height: u32,
    heuristics: &SplitHeuristics,
) -> Option<f64> {
    if x1 <= x0 || height == 0 {
        return None;
    }
    let strip = imageops::crop_imm(gray, x0, 0, x1 - x0, height).to_image();
    let edges = edge_map(&strip, heuristics.canny_low, heuristics.canny_high);
    let total: u64 = edges.as_raw().iter().map(|&v| u64::from(v)).sum();
    Some(total as f64 / edges.as_raw().len() as f64)
}

/// tan(22.5°) in 15-bit fixed point, for the gradient direction sectors.
const TG22: i64 = 13573;
const DIRECTION_SHIFT: u32 = 15;

/// Per-pixel state during hysteresis.
#[derive(Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    None,
    Weak,
    Strong,
}

/// Canny edge map of `gray` without pre-smoothing. Edge pixels are 255,
/// everything else 0.
///
/// A pixel is an edge candidate when its L1 gradient magnitude exceeds
/// `low` and is a local maximum across the gradient direction; candidates
/// above `high` seed edges, which then grow through 8-connected candidates.
/// Thresholds are floored to integers. Gradients replicate the border;
/// magnitudes outside the image count as zero.
pub fn edge_map(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let dx = horizontal_sobel(gray);
    let dy = vertical_sobel(gray);
    let (dx, dy) = (dx.as_raw(), dy.as_raw());
    let magnitude: Vec<i32> = dx
        .iter()
        .zip(dy)
        .map(|(&gx, &gy)| i32::from(gx).abs() + i32::from(gy).abs())
        .collect();
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let low = low.floor() as i32;
    let high = high.floor() as i32;
    let mut state = vec![EdgeState::None; w * h];
    let mut pending = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let (gx, gy) = (i32::from(dx[i]), i32::from(dy[i]));
            let ax = i64::from(gx.abs());
            let ay = i64::from(gy.abs()) << DIRECTION_SHIFT;
            let tg22x = ax * TG22;
            let is_max = if ay < tg22x {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay > tg22x + (ax << (DIRECTION_SHIFT + 1)) {
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else {
                let s = if (gx ^ gy) < 0 { -1 } else { 1 };
                m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
            };
            if !is_max {
                continue;
            }
            if m > high {
                state[i] = EdgeState::Strong;
                pending.push(i);
            } else {
                state[i] = EdgeState::Weak;
            }
        }
    }

    while let Some(i) = pending.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for (nx, ny) in [
            (x - 1, y - 1),
            (x, y - 1),
            (x + 1, y - 1),
            (x - 1, y),
            (x + 1, y),
            (x - 1, y + 1),
            (x, y + 1),
            (x + 1, y + 1),
        ] {
            if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                continue;
            }
            let j = ny as usize * w + nx as usize;
            if state[j] == EdgeState::Weak {
                state[j] = EdgeState::Strong;
                pending.push(j);
            }
        }
    }

    let pixels: Vec<u8> = state
        .iter()
        .map(|&s| if s == EdgeState::Strong { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, pixels).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Spread between the largest and smallest sample over all channels of the
/// columns `x0..x1`; `None` for an empty band.
fn channel_range(image: &RgbImage, x0: u32, x1: u32, height: u32) -> Option<u8> {
    if x1 <= x0 || height == 0 {
        return None;
    }
    let band = imageops::crop_imm(image, x0, 0, x1 - x0, height).to_image();
    let raw = band.as_raw();
    let max = raw.iter().copied().max()?;
    let min = raw.iter().copied().min()?;
    Some(max - min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Two text-like halves separated by a plain white gutter.
    fn spread_with_gutter(width: u32, height: u32) -> RgbImage {
        let gutter = 40;
        RgbImage::from_fn(width, height, |x, y| {
            let in_gutter = x + gutter / 2 >= width / 2 && x < width / 2 + gutter / 2;
            if !in_gutter && (x / 6 + y / 6) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    /// High-contrast checkerboard across the whole page.
    fn dense_texture(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn uniform_gutter_splits() {
        let img = spread_with_gutter(200, 120);
        let verdict = analyze_page(&img, &SplitHeuristics::default());
        assert!(verdict.split);
        assert_eq!(verdict.reason, SplitReason::SparseEdges);
        assert_eq!(verdict.edge_density, Some(0.0));
        assert!(decide(&img, &SplitHeuristics::default()));
    }

    #[test]
    fn dense_texture_across_centre_stays_whole() {
        let img = dense_texture(200, 120);
        let verdict = analyze_page(&img, &SplitHeuristics::default());
        assert!(!verdict.split, "verdict: {verdict:?}");
        assert_eq!(verdict.reason, SplitReason::Continuous);
        assert!(verdict.edge_density.unwrap() > 0.95);
        assert_eq!(verdict.band_range, Some(255));
    }

    #[test]
    fn blank_page_splits_on_edges() {
        let img = RgbImage::from_pixel(100, 100, Rgb([250, 250, 250]));
        assert!(decide(&img, &SplitHeuristics::default()));
    }

    #[test]
    fn uniform_band_splits_when_edges_are_dense() {
        // Texture in the centre strip, flat colour in the band to its right.
        let img = RgbImage::from_fn(200, 120, |x, y| {
            if x >= 110 {
                Rgb([240, 238, 236])
            } else if (x / 4 + y / 4) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let verdict = analyze_page(&img, &SplitHeuristics::default());
        assert!(verdict.split, "verdict: {verdict:?}");
        assert_eq!(verdict.reason, SplitReason::UniformBand);
        assert_eq!(verdict.band_range, Some(4));
    }

    /// Faint one-pixel grey rules every third column over a white page.
    fn faint_hatching(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x % 3 == 0 {
                Rgb([200, 200, 200])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn faint_thin_strokes_count_as_edges() {
        let img = faint_hatching(200, 120);
        let verdict = analyze_page(&img, &SplitHeuristics::default());
        assert!(!verdict.split, "verdict: {verdict:?}");
        assert_eq!(verdict.reason, SplitReason::Continuous);
        let density = verdict.edge_density.unwrap();
        assert!(density > 60.0, "density {density}");
        assert_eq!(verdict.band_range, Some(55));
    }

    #[test]
    fn edge_map_marks_one_side_of_each_rule() {
        let gray = imageops::grayscale(&faint_hatching(30, 10));
        let edges = edge_map(&gray, 50.0, 150.0);
        // Gradient magnitude is 0, 220, 220 per period; the first of each
        // equal pair wins the suppression.
        for y in 0..10 {
            for x in 3..27 {
                let expected = if x % 3 == 1 { 255 } else { 0 };
                assert_eq!(edges.get_pixel(x, y)[0], expected, "({x}, {y})");
            }
        }
    }

    #[test]
    fn weak_edges_need_a_strong_neighbour() {
        // Step of 30 → Sobel magnitude 120: above low, below high.
        let gray = GrayImage::from_fn(20, 20, |x, _| {
            image::Luma([if x < 10 { 100 } else { 130 }])
        });
        let edges = edge_map(&gray, 50.0, 150.0);
        assert!(edges.as_raw().iter().all(|&v| v == 0));
        // Same step at a lower high threshold becomes an edge column.
        let edges = edge_map(&gray, 50.0, 100.0);
        assert_eq!(edges.get_pixel(9, 5)[0], 255);
        assert_eq!(edges.get_pixel(3, 5)[0], 0);
    }

    #[test]
    fn narrow_page_does_not_panic() {
        let img = dense_texture(6, 40);
        let _ = analyze_page(&img, &SplitHeuristics::default());
        let img = dense_texture(1, 1);
        let _ = analyze_page(&img, &SplitHeuristics::default());
    }

    #[test]
    fn empty_image_stays_whole() {
        let img = RgbImage::new(0, 0);
        let verdict = analyze_page(&img, &SplitHeuristics::default());
        assert!(!verdict.split);
        assert_eq!(verdict.edge_density, None);
        assert_eq!(verdict.band_range, None);
    }
}
