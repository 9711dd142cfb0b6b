//! Rasterise a [`Slice`] onto a plate carrée (equirectangular) PNG.
//!
//! Each grid cell becomes a `pixels_per_cell` square, north at the top. Values
//! are coloured with viridis over a fixed range so that images of different
//! levels and times are comparable. Gridlines mark every 5° of latitude and
//! longitude, and a colour bar runs along the bottom edge.

use std::path::{Path, PathBuf};

use aerosol_forecast::Slice;
use anyhow::Context;
use image::{Rgba, RgbaImage};
use tracing::info;

/// Colour range of the extinction coefficient.
pub const VMIN: f32 = 0.0;
pub const VMAX: f32 = 0.001;

const COLOUR_BAR_GAP: u32 = 4;
const COLOUR_BAR_HEIGHT: u32 = 16;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const GRIDLINE: Rgba<u8> = Rgba([128, 128, 128, 255]);
const GRIDLINE_SPACING_DEG: f64 = 5.0;

/// matplotlib's viridis, sampled at nine evenly spaced stops.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [110, 206, 88],
    [253, 231, 37],
];

/// Linear interpolation between the viridis stops. NaN is transparent; values
/// outside `[VMIN, VMAX]` are clamped.
pub fn colour(value: f32) -> Rgba<u8> {
    if value.is_nan() {
        return TRANSPARENT;
    }
    let t = ((value - VMIN) / (VMAX - VMIN)).clamp(0.0, 1.0);
    let position = t * (VIRIDIS.len() - 1) as f32;
    let lower = (position.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = position - lower as f32;
    let (a, b) = (VIRIDIS[lower], VIRIDIS[lower + 1]);
    let mix = |i: usize| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * frac).round() as u8;
    Rgba([mix(0), mix(1), mix(2), 255])
}

#[derive(Debug, Clone)]
pub struct Renderer {
    pixels_per_cell: u32,
    output_dir: PathBuf,
}

impl Renderer {
    pub fn new(pixels_per_cell: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pixels_per_cell: pixels_per_cell.max(1),
            output_dir: output_dir.into(),
        }
    }

    /// e.g. `aerext1064_2024031006_925hPa.png`.
    pub fn default_filename(slice: &Slice) -> String {
        format!(
            "{}_{}_{}hPa.png",
            aerosol_forecast::field::VARIABLE_SHORT_NAME,
            slice.valid_time.format("%Y%m%d%H"),
            slice.level_hpa
        )
    }

    /// Render into the output directory under the default filename.
    pub fn render(&self, slice: &Slice) -> anyhow::Result<PathBuf> {
        let path = self.output_dir.join(Self::default_filename(slice));
        self.render_to(slice, &path)?;
        Ok(path)
    }

    pub fn render_to(&self, slice: &Slice, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let image = self.draw(slice);
        image
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), title = %slice.title(), "Rendered slice");
        Ok(())
    }

    pub fn draw(&self, slice: &Slice) -> RgbaImage {
        let (n_lat, n_lon) = slice.values.dim();
        let ppc = self.pixels_per_cell;
        let map_width = n_lon as u32 * ppc;
        let map_height = n_lat as u32 * ppc;
        let mut image = RgbaImage::from_pixel(
            map_width,
            map_height + COLOUR_BAR_GAP + COLOUR_BAR_HEIGHT,
            TRANSPARENT,
        );

        // Put north at the top and west on the left, whatever order the grid is stored in.
        let flip_rows = is_ascending(&slice.latitudes);
        let flip_cols = is_descending(&slice.longitudes);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            if y >= map_height {
                continue;
            }
            let mut row = (y / ppc) as usize;
            let mut col = (x / ppc) as usize;
            if flip_rows {
                row = n_lat - 1 - row;
            }
            if flip_cols {
                col = n_lon - 1 - col;
            }
            *pixel = colour(slice.values[[row, col]]);
        }

        let mut north_to_south = slice.latitudes.clone();
        if flip_rows {
            north_to_south.reverse();
        }
        let mut west_to_east = slice.longitudes.clone();
        if flip_cols {
            west_to_east.reverse();
        }
        for y in gridline_offsets(&north_to_south, ppc) {
            for x in 0..map_width {
                image.put_pixel(x, y, GRIDLINE);
            }
        }
        for x in gridline_offsets(&west_to_east, ppc) {
            for y in 0..map_height {
                image.put_pixel(x, y, GRIDLINE);
            }
        }

        let bar_top = map_height + COLOUR_BAR_GAP;
        for x in 0..map_width {
            let t = if map_width > 1 {
                x as f32 / (map_width - 1) as f32
            } else {
                0.0
            };
            let value = VMIN + t * (VMAX - VMIN);
            for y in bar_top..bar_top + COLOUR_BAR_HEIGHT {
                image.put_pixel(x, y, colour(value));
            }
        }
        image
    }
}

/// Pixel offsets of the multiples of [`GRIDLINE_SPACING_DEG`] along a displayed
/// axis of cell-centre coordinates. Needs at least two cells to place anything.
fn gridline_offsets(axis: &[f64], pixels_per_cell: u32) -> Vec<u32> {
    let (Some(&start), Some(&end)) = (axis.first(), axis.last()) else {
        return Vec::new();
    };
    if axis.len() < 2 || start == end {
        return Vec::new();
    }
    let ppc = f64::from(pixels_per_cell);
    let span_px = (axis.len() - 1) as f64 * ppc;
    let extent_px = axis.len() as u32 * pixels_per_cell;
    let (low, high) = (start.min(end), start.max(end));
    let first = (low / GRIDLINE_SPACING_DEG).ceil() as i64;
    let last = (high / GRIDLINE_SPACING_DEG).floor() as i64;
    let mut offsets: Vec<u32> = (first..=last)
        .map(|k| k as f64 * GRIDLINE_SPACING_DEG)
        .map(|deg| ((deg - start) / (end - start) * span_px + ppc / 2.0).floor() as u32)
        .filter(|offset| *offset < extent_px)
        .collect();
    offsets.sort_unstable();
    offsets
}

fn is_ascending(axis: &[f64]) -> bool {
    matches!((axis.first(), axis.last()), (Some(first), Some(last)) if first < last)
}

fn is_descending(axis: &[f64]) -> bool {
    matches!((axis.first(), axis.last()), (Some(first), Some(last)) if first > last)
}
