//! A `MapClient` that rasterizes boundary outlines into Web Mercator preview
//! tiles laid out as `{tile_dir}/{z}/{x}/{y}.png`.

use crate::config::{OutputConfig, TileLayerConfig};
use crate::error::RenderError;
use crate::render::MapClient;
use crate::types::{LatLng, Polygon};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

// Constants for Web Mercator
const TILE_SIZE: u32 = 256;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;
// Deepest zoom web tile servers publish; also keeps world pixels inside u32.
pub const MAX_TILE_ZOOM: u8 = 22;

pub struct TileRasterizer {
    min_zoom: u8,
    max_zoom: u8,
    stroke: Rgba<u8>,
    polygons: Vec<Polygon>,
    initialized: bool,
}

impl TileRasterizer {
    pub fn new(output: &OutputConfig) -> Result<Self, RenderError> {
        check_zoom_bounds(output.min_zoom, output.max_zoom)?;
        Ok(Self {
            min_zoom: output.min_zoom,
            max_zoom: output.max_zoom,
            stroke: hex_to_rgba(&output.stroke_color),
            polygons: Vec::new(),
            initialized: false,
        })
    }

    pub fn zoom_range(&self) -> std::ops::RangeInclusive<u8> {
        self.min_zoom..=self.max_zoom
    }

    /// Render every zoom level in parallel and write the tiles. Returns the
    /// number of tiles written.
    pub fn write_tiles(&self, tile_dir: &Path) -> Result<usize, RenderError> {
        info!(
            "Generating preview tiles from min_zoom {} to max_zoom {}...",
            self.min_zoom, self.max_zoom
        );

        let written: Vec<usize> = self
            .zoom_range()
            .into_par_iter()
            .map(|z| self.render_zoom_level(tile_dir, z))
            .collect::<Result<_, _>>()?;

        let total = written.iter().sum();
        info!("Wrote {} tiles to {:?}", total, tile_dir);
        Ok(total)
    }

    fn render_zoom_level(&self, tile_dir: &Path, zoom: u8) -> Result<usize, RenderError> {
        debug!("Rendering z{}", zoom);
        let tiles = self.rasterize(zoom);

        let z_dir = tile_dir.join(zoom.to_string());
        for ((x, y), img) in &tiles {
            let x_dir = z_dir.join(x.to_string());
            fs::create_dir_all(&x_dir)?;
            img.save(x_dir.join(format!("{}.png", y)))?;
        }

        Ok(tiles.len())
    }

    fn rasterize(&self, zoom: u8) -> HashMap<(u32, u32), RgbaImage> {
        let mut tiles: HashMap<(u32, u32), RgbaImage> = HashMap::new();

        for polygon in &self.polygons {
            let points: Vec<(i64, i64)> = polygon
                .points()
                .iter()
                .map(|p| lat_lng_to_world_pixel(*p, zoom))
                .collect();

            // Outline, closing edge included.
            for (i, &from) in points.iter().enumerate() {
                let to = points[(i + 1) % points.len()];
                for (px, py) in line_pixels(from, to) {
                    let (tx, ty) = (px as u32 / TILE_SIZE, py as u32 / TILE_SIZE);
                    let tile = tiles
                        .entry((tx, ty))
                        .or_insert_with(|| ImageBuffer::new(TILE_SIZE, TILE_SIZE));
                    tile.put_pixel(px as u32 % TILE_SIZE, py as u32 % TILE_SIZE, self.stroke);
                }
            }
        }

        tiles
    }
}

impl MapClient for TileRasterizer {
    fn set_view(&mut self, _center: LatLng, _zoom: u8) -> Result<(), RenderError> {
        if self.initialized {
            return Err(RenderError::AlreadyInitialized);
        }
        self.initialized = true;
        Ok(())
    }

    /// Preview tiles are only produced inside the layer's zoom bounds.
    fn add_tile_layer(&mut self, layer: &TileLayerConfig) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        check_zoom_bounds(layer.min_zoom, layer.max_zoom)?;
        self.min_zoom = self.min_zoom.max(layer.min_zoom);
        self.max_zoom = self.max_zoom.min(layer.max_zoom);
        check_zoom_bounds(self.min_zoom, self.max_zoom)
    }

    fn add_polygon(&mut self, polygon: &Polygon, _popup: &str) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        if let Some(defect) = polygon.defect() {
            return Err(RenderError::MalformedPolygon(defect));
        }
        self.polygons.push(polygon.clone());
        Ok(())
    }
}

fn check_zoom_bounds(min_zoom: u8, max_zoom: u8) -> Result<(), RenderError> {
    if min_zoom > max_zoom || max_zoom > MAX_TILE_ZOOM {
        return Err(RenderError::InvalidTileLayer { min_zoom, max_zoom });
    }
    Ok(())
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0..2), channel(2..4), channel(4..6), 255])
}

// Coordinate conversions
fn lat_lng_to_world_pixel(point: LatLng, zoom: u8) -> (i64, i64) {
    let n = 2.0_f64.powi(zoom as i32);
    let world = (TILE_SIZE as f64 * n) as i64;

    let x_t = (point.lng() + 180.0) / 360.0 * n;
    let lat_rad = point.lat().clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let y_t = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;

    let px = ((x_t * TILE_SIZE as f64) as i64).clamp(0, world - 1);
    let py = ((y_t * TILE_SIZE as f64) as i64).clamp(0, world - 1);
    (px, py)
}

/// Bresenham line, both ends included.
fn line_pixels(from: (i64, i64), to: (i64, i64)) -> Vec<(i64, i64)> {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut pixels = Vec::new();
    loop {
        pixels.push((x, y));
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    pixels
}
